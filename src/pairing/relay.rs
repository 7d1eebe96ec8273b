//! Relay-backed pairing client - tokio-tungstenite WebSocket.
//!
//! Speaks a plaintext JSON frame protocol with the relay:
//!   {"op":"subscribe","topic":t}            → start receiving a topic
//!   {"op":"unsubscribe","topic":t}          → stop
//!   {"op":"publish","topic":t,"payload":p}  → send a JSON-RPC payload
//!   {"op":"message","topic":t,"payload":p}  ← inbound JSON-RPC payload
//!
//! Payload envelope encryption is out of scope here; this is a reference
//! wallet talking to a cooperating relay.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::{
    PairingEvent, PeerMetadata, Reason, RpcReply, SessionInfo, SessionNamespace, SessionProposal,
    SessionRequest,
};
use crate::error::{Error, Result};

/// Relay connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Disconnected,
    Connecting,
    Connected,
}

/// Parsed pairing URI: `wc:<topic>@<version>?key=value&...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingUri {
    pub topic: String,
    pub version: u32,
}

/// Parse a pairing URI, tolerating unknown query parameters.
pub fn parse_pairing_uri(uri: &str) -> Result<PairingUri> {
    let rest = uri
        .strip_prefix("wc:")
        .ok_or_else(|| Error::Pairing(format!("not a pairing uri: {}", uri)))?;
    let head = rest.split('?').next().unwrap_or(rest);
    let (topic, version) = head
        .split_once('@')
        .ok_or_else(|| Error::Pairing("pairing uri has no version".into()))?;
    if topic.is_empty() {
        return Err(Error::Pairing("pairing uri has no topic".into()));
    }
    let version = version
        .parse()
        .map_err(|_| Error::Pairing(format!("bad pairing version: {}", version)))?;
    Ok(PairingUri { topic: topic.to_string(), version })
}

/// Inbound relay frames
#[derive(Debug)]
pub enum RelayFrame {
    Message { topic: String, payload: Value },
    Subscribed { topic: String },
    Error { message: String },
}

/// Parse one relay frame
pub fn parse_relay_frame(msg: &str) -> Option<RelayFrame> {
    let frame: Value = serde_json::from_str(msg).ok()?;
    match frame["op"].as_str()? {
        "message" => Some(RelayFrame::Message {
            topic: frame["topic"].as_str()?.to_string(),
            payload: frame.get("payload")?.clone(),
        }),
        "subscribed" => Some(RelayFrame::Subscribed { topic: frame["topic"].as_str()?.to_string() }),
        "error" => Some(RelayFrame::Error {
            message: frame["message"].as_str().unwrap_or("unknown").to_string(),
        }),
        _ => None,
    }
}

struct StagedProposal {
    topic: String,
    peer: PeerMetadata,
}

/// Pairing client over one relay connection.
pub struct RelayPairing {
    url: String,
    events: mpsc::Sender<PairingEvent>,
    state: Arc<RwLock<RelayState>>,
    out: RwLock<Option<mpsc::Sender<String>>>,
    sessions: Arc<RwLock<HashMap<String, SessionInfo>>>,
    proposals: Arc<RwLock<HashMap<u64, StagedProposal>>>,
}

impl RelayPairing {
    pub fn new(url: impl Into<String>, events: mpsc::Sender<PairingEvent>) -> Self {
        Self {
            url: url.into(),
            events,
            state: Arc::new(RwLock::new(RelayState::Disconnected)),
            out: RwLock::new(None),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            proposals: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn state(&self) -> RelayState {
        *self.state.read().await
    }

    /// Connect to the relay
    pub async fn connect(&self) -> Result<()> {
        *self.state.write().await = RelayState::Connecting;

        let (ws, _) = connect_async(&self.url)
            .await
            .map_err(|e| Error::Pairing(format!("connect {}: {}", self.url, e)))?;
        let (mut write, mut read) = ws.split();

        let (out_tx, mut out_rx) = mpsc::channel::<String>(32);
        *self.out.write().await = Some(out_tx);

        let state = self.state.clone();
        *state.write().await = RelayState::Connected;
        info!("pairing relay connected to {}", self.url);

        // Writer task
        let state_w = state.clone();
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                if write.send(Message::Text(msg)).await.is_err() {
                    break;
                }
            }
            *state_w.write().await = RelayState::Disconnected;
        });

        // Reader task: turn relay frames into pairing events
        let state_r = state.clone();
        let events = self.events.clone();
        let sessions = self.sessions.clone();
        let proposals = self.proposals.clone();
        tokio::spawn(async move {
            while let Some(Ok(msg)) = read.next().await {
                let Message::Text(txt) = msg else { continue };
                match parse_relay_frame(&txt) {
                    Some(RelayFrame::Message { topic, payload }) => {
                        if let Some(event) =
                            classify_payload(&topic, &payload, &sessions, &proposals).await
                        {
                            if events.send(event).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(RelayFrame::Subscribed { topic }) => debug!(%topic, "subscribed"),
                    Some(RelayFrame::Error { message }) => warn!("relay error: {}", message),
                    None => debug!("unparseable relay frame"),
                }
            }
            *state_r.write().await = RelayState::Disconnected;
            warn!("pairing relay disconnected");
        });

        Ok(())
    }

    async fn send(&self, frame: Value) -> Result<()> {
        let sender = self
            .out
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::Pairing("not connected".into()))?;
        sender
            .send(frame.to_string())
            .await
            .map_err(|_| Error::Pairing("connection closed".into()))
    }

    async fn publish(&self, topic: &str, payload: Value) -> Result<()> {
        self.send(json!({"op": "publish", "topic": topic, "payload": payload})).await
    }
}

/// Map an inbound JSON-RPC payload to a pairing event. Proposals are
/// remembered so a later approve/reject can find their topic.
async fn classify_payload(
    topic: &str,
    payload: &Value,
    sessions: &Arc<RwLock<HashMap<String, SessionInfo>>>,
    proposals: &Arc<RwLock<HashMap<u64, StagedProposal>>>,
) -> Option<PairingEvent> {
    match payload["method"].as_str() {
        Some("wc_sessionPropose") => {
            let proposal = parse_proposal(payload)?;
            proposals.write().await.insert(
                proposal.id,
                StagedProposal { topic: topic.to_string(), peer: proposal.proposer.clone() },
            );
            Some(PairingEvent::Proposal(proposal))
        }
        Some("wc_sessionRequest") => {
            let request = parse_request(topic, payload)?;
            Some(PairingEvent::Request(request))
        }
        Some("wc_sessionDelete") => {
            sessions.write().await.remove(topic);
            Some(PairingEvent::SessionDeleted { topic: topic.to_string() })
        }
        Some(method) => {
            debug!(%method, "ignoring relay payload");
            None
        }
        None => None,
    }
}

fn parse_proposal(payload: &Value) -> Option<SessionProposal> {
    let id = payload["id"].as_u64()?;
    let params = &payload["params"];
    Some(SessionProposal {
        id,
        proposer: serde_json::from_value(params["proposer"]["metadata"].clone())
            .unwrap_or_default(),
        required_namespaces: serde_json::from_value(params["requiredNamespaces"].clone())
            .unwrap_or_default(),
        optional_namespaces: serde_json::from_value(params["optionalNamespaces"].clone())
            .unwrap_or_default(),
    })
}

fn parse_request(topic: &str, payload: &Value) -> Option<SessionRequest> {
    let id = payload["id"].as_u64()?;
    let request = &payload["params"]["request"];
    let method = request["method"].as_str()?.to_string();
    // Dapps are inconsistent about the payload key; accept both spellings.
    let tx_json = request["params"]
        .get("tx_json")
        .or_else(|| request["params"].get("transaction"))
        .cloned()?;
    Some(SessionRequest { id, topic: topic.to_string(), method, tx_json })
}

#[async_trait::async_trait]
impl super::Pairing for RelayPairing {
    async fn pair(&self, uri: &str) -> Result<String> {
        let parsed = parse_pairing_uri(uri)?;
        self.send(json!({"op": "subscribe", "topic": parsed.topic})).await?;
        info!(topic = %parsed.topic, "paired");
        Ok(parsed.topic)
    }

    async fn sessions(&self) -> Vec<SessionInfo> {
        self.sessions.read().await.values().cloned().collect()
    }

    async fn approve_session(
        &self,
        id: u64,
        namespaces: BTreeMap<String, SessionNamespace>,
    ) -> Result<()> {
        let staged = self
            .proposals
            .write()
            .await
            .remove(&id)
            .ok_or_else(|| Error::Pairing(format!("unknown proposal {}", id)))?;

        let reply = RpcReply::Result { id, result: json!({"namespaces": namespaces}) };
        self.publish(&staged.topic, reply.to_json()).await?;

        self.sessions.write().await.insert(
            staged.topic.clone(),
            SessionInfo { topic: staged.topic, peer: staged.peer },
        );
        Ok(())
    }

    async fn reject_session(&self, id: u64, reason: Reason) -> Result<()> {
        let staged = self
            .proposals
            .write()
            .await
            .remove(&id)
            .ok_or_else(|| Error::Pairing(format!("unknown proposal {}", id)))?;
        let reply =
            RpcReply::Error { id, code: reason.code as i64, message: reason.message };
        self.publish(&staged.topic, reply.to_json()).await
    }

    async fn respond(&self, topic: &str, reply: RpcReply) -> Result<()> {
        self.publish(topic, reply.to_json()).await
    }

    async fn disconnect(&self, topic: &str, reason: Reason) -> Result<()> {
        self.publish(topic, json!({"method": "wc_sessionDelete", "params": reason})).await?;
        self.send(json!({"op": "unsubscribe", "topic": topic})).await?;
        self.sessions.write().await.remove(topic);
        Ok(())
    }
}
