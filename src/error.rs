//! Error taxonomy for the approval and signing paths.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Stale or mismatched id on approve/reject, or nothing staged.
    #[error("no pending item with id {0}")]
    NotFound(u64),

    /// Signing or approval attempted with no loaded identity.
    #[error("no wallet loaded")]
    NoWallet,

    /// Proposal is missing a usable chain namespace.
    #[error("invalid proposal: {0}")]
    InvalidProposal(String),

    /// Gateway/network failure talking to the ledger.
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// Ledger has no record of the address.
    #[error("account not found: {0}")]
    AccountNotFound(String),

    /// Pairing transport failure (relay unreachable, publish failed).
    #[error("pairing: {0}")]
    Pairing(String),

    /// Malformed key material (seed decode, signature assembly).
    #[error("key material: {0}")]
    Keys(String),

    /// Wallet file persistence.
    #[error("persistence: {0}")]
    Persist(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}
