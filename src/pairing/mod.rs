//! Pairing session manager - narrow interface to the dapp-facing channel.
//!
//! The approval path consumes [`PairingEvent`]s from a bounded inbox and
//! drives the [`Pairing`] trait; the relay transport behind it lives in
//! [`relay`].

pub mod relay;

pub use relay::{parse_pairing_uri, PairingUri, RelayPairing, RelayState};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::error::Result;

/// The only session-request method this wallet stages for approval.
pub const SIGN_METHOD: &str = "xrpl_signTransaction";
/// Chain namespace key negotiated during pairing.
pub const CHAIN_NAMESPACE: &str = "xrpl";

/// JSON-RPC error code for a signing failure reported to the dapp.
pub const ERR_REQUEST_FAILED: i64 = -32000;
/// JSON-RPC error code for an operator rejection reported to the dapp.
pub const ERR_USER_REJECTED: i64 = -32001;

/// Dapp (or wallet) identity shown during pairing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerMetadata {
    pub name: String,
    pub description: String,
    pub url: String,
    pub icons: Vec<String>,
}

/// Chain-scoped capability declaration requested by a dapp.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProposalNamespace {
    pub chains: Vec<String>,
    pub methods: Vec<String>,
    pub events: Vec<String>,
}

/// Chain-scoped capabilities granted on approval.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionNamespace {
    pub accounts: Vec<String>,
    pub methods: Vec<String>,
    pub events: Vec<String>,
}

/// Inbound connection proposal. At most one is staged at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProposal {
    pub id: u64,
    #[serde(default)]
    pub proposer: PeerMetadata,
    #[serde(default)]
    pub required_namespaces: BTreeMap<String, ProposalNamespace>,
    #[serde(default)]
    pub optional_namespaces: BTreeMap<String, ProposalNamespace>,
}

/// Inbound transaction-signing request. Carries its originating topic so
/// responses route back to the session that asked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRequest {
    pub id: u64,
    pub topic: String,
    pub method: String,
    pub tx_json: Value,
}

/// An established, topic-identified session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub topic: String,
    pub peer: PeerMetadata,
}

/// Events emitted by the session manager onto the controller's inbox.
#[derive(Debug, Clone)]
pub enum PairingEvent {
    Proposal(SessionProposal),
    Request(SessionRequest),
    SessionDeleted { topic: String },
}

/// Reason attached to rejections and disconnects.
#[derive(Debug, Clone, Serialize)]
pub struct Reason {
    pub code: u32,
    pub message: String,
}

impl Reason {
    pub fn user_rejected() -> Self {
        Self { code: 1, message: "User rejected the connection".into() }
    }

    pub fn user_disconnected() -> Self {
        Self { code: 6000, message: "User disconnected".into() }
    }
}

/// JSON-RPC reply published back to a session topic.
#[derive(Debug, Clone)]
pub enum RpcReply {
    Result { id: u64, result: Value },
    Error { id: u64, code: i64, message: String },
}

impl RpcReply {
    pub fn to_json(&self) -> Value {
        match self {
            RpcReply::Result { id, result } => {
                json!({"id": id, "jsonrpc": "2.0", "result": result})
            }
            RpcReply::Error { id, code, message } => {
                json!({"id": id, "jsonrpc": "2.0", "error": {"code": code, "message": message}})
            }
        }
    }
}

/// Collaborator contract the core depends on.
#[async_trait]
pub trait Pairing: Send + Sync {
    /// Pair with a dapp URI; returns the pairing topic.
    async fn pair(&self, uri: &str) -> Result<String>;

    /// Currently established sessions.
    async fn sessions(&self) -> Vec<SessionInfo>;

    /// Approve a staged proposal with the granted namespaces.
    async fn approve_session(
        &self,
        id: u64,
        namespaces: BTreeMap<String, SessionNamespace>,
    ) -> Result<()>;

    /// Reject a staged proposal.
    async fn reject_session(&self, id: u64, reason: Reason) -> Result<()>;

    /// Publish a JSON-RPC reply to a session topic.
    async fn respond(&self, topic: &str, reply: RpcReply) -> Result<()>;

    /// Tear down one session.
    async fn disconnect(&self, topic: &str, reason: Reason) -> Result<()>;
}
