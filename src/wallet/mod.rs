//! Wallet store - at most one signing identity, persisted to a JSON file.
//!
//! The identity is replaced wholesale on creation and never mutated.
//! Persistence failures are logged and non-fatal: the node keeps running
//! with whatever identity is in memory.

pub mod keys;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::ledger::LedgerGateway;
use self::keys::Keypair;

/// Signing payload prefix for single signatures.
const TX_SIGN_PREFIX: &[u8] = b"STX\0";
/// Hash prefix for signed transaction blobs.
const TX_HASH_PREFIX: &[u8] = b"TXN\0";

/// One signing identity: classic address, encoded family seed, public key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletIdentity {
    pub address: String,
    pub seed: String,
    pub public_key: String,
}

impl WalletIdentity {
    /// Derive a full identity from freshly generated key material.
    pub fn from_keypair(pair: &Keypair) -> Self {
        Self {
            address: pair.address(),
            seed: pair.seed().to_string(),
            public_key: pair.public_key_hex(),
        }
    }
}

/// Result of signing: the annotated transaction, its hex blob, and hash.
#[derive(Debug, Clone, Serialize)]
pub struct SignedTransaction {
    pub tx_json: Value,
    pub tx_blob: String,
    pub hash: String,
}

/// Holds the current identity and its file-backed copy.
pub struct WalletStore {
    path: PathBuf,
    identity: Mutex<Option<WalletIdentity>>,
}

impl WalletStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path, identity: Mutex::new(None) }
    }

    /// Load a previously persisted identity. Missing or unreadable files
    /// leave the store empty; the caller decides whether that matters.
    pub fn load(&self) {
        match std::fs::read_to_string(&self.path) {
            Ok(data) => match serde_json::from_str::<WalletIdentity>(&data) {
                Ok(identity) => {
                    info!(address = %identity.address, "loaded wallet from {}", self.path.display());
                    *self.identity.lock().expect("wallet lock") = Some(identity);
                }
                Err(e) => warn!("wallet file {} unreadable: {}", self.path.display(), e),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no wallet at {}, starting empty", self.path.display());
            }
            Err(e) => warn!("wallet file {}: {}", self.path.display(), e),
        }
    }

    fn persist(&self, identity: &WalletIdentity) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(identity)?)?;
        Ok(())
    }

    /// Generate, fund, and adopt a new identity. The previous identity, if
    /// any, is replaced wholesale.
    pub async fn create(&self, gateway: &dyn LedgerGateway) -> Result<WalletIdentity> {
        let identity = gateway.fund_new_account().await?;
        if let Err(e) = self.persist(&identity) {
            warn!("could not persist wallet to {}: {}", self.path.display(), e);
        }
        *self.identity.lock().expect("wallet lock") = Some(identity.clone());
        info!(address = %identity.address, "wallet created");
        Ok(identity)
    }

    pub fn identity(&self) -> Option<WalletIdentity> {
        self.identity.lock().expect("wallet lock").clone()
    }

    pub fn address(&self) -> Option<String> {
        self.identity.lock().expect("wallet lock").as_ref().map(|w| w.address.clone())
    }

    /// Sign a prepared transaction with the current identity's key material.
    /// Local and deterministic; fails only with no identity or a malformed
    /// transaction object.
    pub fn sign(&self, tx: &Value) -> Result<SignedTransaction> {
        let identity = self.identity().ok_or(Error::NoWallet)?;
        if !tx.is_object() {
            return Err(Error::Keys("transaction must be a JSON object".into()));
        }
        let pair = Keypair::from_seed(&identity.seed)?;
        Ok(sign_transaction(&pair, tx))
    }
}

/// Attach `SigningPubKey` and `TxnSignature`, then produce the hex blob and
/// hash. Serialization is canonical: serde_json object keys are ordered, so
/// the signing payload is stable for a given transaction.
pub fn sign_transaction(pair: &Keypair, tx: &Value) -> SignedTransaction {
    let mut tx = tx.clone();
    tx["SigningPubKey"] = json!(pair.public_key_hex());

    let unsigned = serde_json::to_vec(&tx).expect("serializable transaction");
    let mut payload = TX_SIGN_PREFIX.to_vec();
    payload.extend_from_slice(&unsigned);
    let signature = pair.sign(&payload);
    tx["TxnSignature"] = json!(hex::encode_upper(signature.to_bytes()));

    let blob_bytes = serde_json::to_vec(&tx).expect("serializable transaction");
    let tx_blob = hex::encode_upper(&blob_bytes);

    let mut hash_input = TX_HASH_PREFIX.to_vec();
    hash_input.extend_from_slice(&blob_bytes);
    let hash = hex::encode_upper(keys::sha512_half(&hash_input));

    SignedTransaction { tx_json: tx, tx_blob, hash }
}
