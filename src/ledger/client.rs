//! XRP Ledger WebSocket client - tokio-tungstenite JSON-RPC.
//!
//! One shared connection; requests are correlated by id. A dropped
//! connection fails every in-flight request and is not retried.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::{AccountInfo, LedgerGateway, DEFAULT_FEE_DROPS};
use crate::error::{Error, Result};
use crate::wallet::keys::Keypair;
use crate::wallet::WalletIdentity;

/// Ledger advance allowance when autofilling `LastLedgerSequence`.
const EXPIRY_LEDGER_OFFSET: u64 = 20;
/// Account-appearance polling after faucet funding: attempt cap and delay.
const FUND_POLL_ATTEMPTS: u32 = 15;
const FUND_POLL_DELAY: Duration = Duration::from_secs(2);

/// Gateway connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

/// WebSocket gateway to the XRP Ledger, plus the HTTP faucet for funding.
pub struct WsLedger {
    url: String,
    faucet_url: String,
    http: reqwest::Client,
    state: Arc<RwLock<ConnectionState>>,
    out: RwLock<Option<mpsc::Sender<String>>>,
    pending: PendingMap,
    next_id: AtomicU64,
}

impl WsLedger {
    pub fn new(url: impl Into<String>, faucet_url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            faucet_url: faucet_url.into(),
            http: reqwest::Client::new(),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            out: RwLock::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Connect to the ledger node
    pub async fn connect(&self) -> Result<()> {
        *self.state.write().await = ConnectionState::Connecting;

        let (ws, _) = connect_async(&self.url)
            .await
            .map_err(|e| Error::LedgerUnavailable(format!("connect {}: {}", self.url, e)))?;
        let (mut write, mut read) = ws.split();

        let (out_tx, mut out_rx) = mpsc::channel::<String>(32);
        *self.out.write().await = Some(out_tx);

        let state = self.state.clone();
        *state.write().await = ConnectionState::Connected;
        info!("ledger gateway connected to {}", self.url);

        // Writer task
        let state_w = state.clone();
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                if write.send(Message::Text(msg)).await.is_err() {
                    break;
                }
            }
            *state_w.write().await = ConnectionState::Disconnected;
        });

        // Reader task: route responses to their waiting request by id
        let state_r = state.clone();
        let pending = self.pending.clone();
        tokio::spawn(async move {
            while let Some(Ok(msg)) = read.next().await {
                if let Message::Text(txt) = msg {
                    let Ok(response) = serde_json::from_str::<Value>(&txt) else {
                        debug!("unparseable ledger frame");
                        continue;
                    };
                    if let Some(id) = response["id"].as_u64() {
                        if let Some(tx) = pending.lock().expect("pending lock").remove(&id) {
                            let _ = tx.send(response);
                        }
                    }
                }
            }
            *state_r.write().await = ConnectionState::Disconnected;
            // Dropping the senders fails every in-flight request.
            pending.lock().expect("pending lock").clear();
            warn!("ledger gateway disconnected");
        });

        Ok(())
    }

    /// Issue one JSON-RPC request and await its response.
    async fn request(&self, mut body: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        body["id"] = json!(id);

        let (tx, rx) = oneshot::channel();
        self.pending.lock().expect("pending lock").insert(id, tx);

        let sender = self
            .out
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::LedgerUnavailable("not connected".into()))?;
        if sender.send(body.to_string()).await.is_err() {
            self.pending.lock().expect("pending lock").remove(&id);
            return Err(Error::LedgerUnavailable("connection closed".into()));
        }

        rx.await.map_err(|_| Error::LedgerUnavailable("connection closed".into()))
    }

    async fn current_ledger_index(&self) -> Result<u64> {
        let response = self.request(json!({"command": "ledger_current"})).await?;
        response["result"]["ledger_current_index"]
            .as_u64()
            .ok_or_else(|| Error::LedgerUnavailable("malformed ledger_current response".into()))
    }

    async fn lookup_account(&self, address: &str) -> Result<AccountInfo> {
        let response = self
            .request(json!({
                "command": "account_info",
                "account": address,
                "ledger_index": "validated",
            }))
            .await?;

        if response["status"] == "error" {
            let code = response["error"].as_str().unwrap_or("unknown");
            return Err(if code == "actNotFound" {
                Error::AccountNotFound(address.to_string())
            } else {
                Error::LedgerUnavailable(format!("account_info: {}", code))
            });
        }

        let data = &response["result"]["account_data"];
        let sequence = data["Sequence"]
            .as_u64()
            .ok_or_else(|| Error::LedgerUnavailable("malformed account_info response".into()))?;
        Ok(AccountInfo {
            sequence: sequence as u32,
            balance: data["Balance"].as_str().unwrap_or("0").to_string(),
        })
    }

    /// Poll until the ledger sees the address, bounded by the attempt cap.
    async fn wait_for_account(&self, address: &str) -> Result<AccountInfo> {
        for attempt in 1..=FUND_POLL_ATTEMPTS {
            match self.lookup_account(address).await {
                Ok(info) => {
                    info!(%address, attempt, "account visible on ledger");
                    return Ok(info);
                }
                Err(Error::AccountNotFound(_)) => {
                    debug!(%address, attempt, "account not visible yet");
                    tokio::time::sleep(FUND_POLL_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
        Err(Error::AccountNotFound(address.to_string()))
    }
}

#[async_trait::async_trait]
impl LedgerGateway for WsLedger {
    async fn account_info(&self, address: &str) -> Result<AccountInfo> {
        self.lookup_account(address).await
    }

    async fn autofill(&self, mut tx: Value) -> Result<Value> {
        if tx.get("Fee").is_none() {
            tx["Fee"] = json!(DEFAULT_FEE_DROPS);
        }
        if tx.get("Sequence").is_none() {
            if let Some(account) = tx["Account"].as_str().map(str::to_owned) {
                tx["Sequence"] = json!(self.lookup_account(&account).await?.sequence);
            }
        }
        if tx.get("LastLedgerSequence").is_none() {
            let index = self.current_ledger_index().await?;
            tx["LastLedgerSequence"] = json!(index + EXPIRY_LEDGER_OFFSET);
        }
        Ok(tx)
    }

    async fn fund_new_account(&self) -> Result<WalletIdentity> {
        let pair = Keypair::generate();
        let identity = WalletIdentity::from_keypair(&pair);
        info!(address = %identity.address, "requesting faucet funding");

        let response = self
            .http
            .post(&self.faucet_url)
            .json(&json!({"destination": identity.address}))
            .send()
            .await
            .map_err(|e| Error::LedgerUnavailable(format!("faucet: {}", e)))?;
        if !response.status().is_success() {
            return Err(Error::LedgerUnavailable(format!("faucet: HTTP {}", response.status())));
        }

        self.wait_for_account(&identity.address).await?;
        Ok(identity)
    }
}
