//! Ledger gateway - narrow interface to the XRP Ledger.
//!
//! The approval path only ever sees the [`LedgerGateway`] trait; the
//! WebSocket client behind it lives in [`client`].

pub mod client;

pub use client::{ConnectionState, WsLedger};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::wallet::WalletIdentity;

/// Smallest ledger currency unit per native unit.
pub const DROPS_PER_XRP: f64 = 1_000_000.0;

/// Default fee in drops applied when a transaction omits one.
pub const DEFAULT_FEE_DROPS: &str = "12";

/// Snapshot of an account's on-ledger state.
#[derive(Debug, Clone)]
pub struct AccountInfo {
    pub sequence: u32,
    /// Balance in drops, as the ledger reports it.
    pub balance: String,
}

/// Collaborator contract the core depends on.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Fails `AccountNotFound` if the ledger has never seen the address.
    async fn account_info(&self, address: &str) -> Result<AccountInfo>;

    /// Fill required-but-omitted transaction fields (fee, sequence,
    /// expiry ledger bound).
    async fn autofill(&self, tx: Value) -> Result<Value>;

    /// Generate a fresh identity and fund it via the testnet faucet.
    async fn fund_new_account(&self) -> Result<WalletIdentity>;
}
