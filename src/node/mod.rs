//! Node - the application context object.
//!
//! Owns the wallet store, ledger gateway, pairing client, pending store and
//! approval controller. Everything hangs off an explicit context built from
//! [`NodeConfig`], so tests can construct isolated instances.

mod config;

pub use config::{
    NodeConfig, DEFAULT_FAUCET_URL, DEFAULT_LEDGER_URL, DEFAULT_PORT, DEFAULT_RELAY_URL,
};

use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::warn;

use crate::approval::{Controller, PendingRequests};
use crate::ledger::WsLedger;
use crate::pairing::{PairingEvent, RelayPairing};
use crate::wallet::WalletStore;

/// Inbox depth for inbound pairing events.
const EVENT_INBOX_CAPACITY: usize = 32;

pub struct Node {
    config: NodeConfig,
    wallet: Arc<WalletStore>,
    ledger: Arc<WsLedger>,
    pairing: Arc<RelayPairing>,
    pending: Arc<PendingRequests>,
    controller: Arc<Controller>,
    inbox: Mutex<Option<mpsc::Receiver<PairingEvent>>>,
}

impl Node {
    pub fn from_config(config: NodeConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_INBOX_CAPACITY);

        let wallet = Arc::new(WalletStore::new(config.wallet_path()));
        let ledger = Arc::new(WsLedger::new(&config.ledger_url, &config.faucet_url));
        let pairing = Arc::new(RelayPairing::new(&config.relay_url, events_tx));
        let pending = Arc::new(PendingRequests::new());
        let controller = Arc::new(Controller::new(
            pending.clone(),
            wallet.clone(),
            ledger.clone(),
            pairing.clone(),
        ));

        Self {
            config,
            wallet,
            ledger,
            pairing,
            pending,
            controller,
            inbox: Mutex::new(Some(events_rx)),
        }
    }

    /// Bring up collaborators and start consuming pairing events.
    /// Connectivity failures degrade rather than abort: the facade stays up
    /// and each failing request path reports its own error.
    pub async fn start(&self) {
        self.wallet.load();

        if let Err(e) = self.ledger.connect().await {
            warn!("ledger gateway unavailable at startup: {}", e);
        }
        if let Err(e) = self.pairing.connect().await {
            warn!("pairing relay unavailable at startup: {}", e);
        }

        if let Some(rx) = self.inbox.lock().expect("inbox lock").take() {
            self.controller.clone().spawn_inbox(rx);
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn wallet(&self) -> &Arc<WalletStore> {
        &self.wallet
    }

    pub fn ledger(&self) -> &Arc<WsLedger> {
        &self.ledger
    }

    pub fn pairing(&self) -> &Arc<RelayPairing> {
        &self.pairing
    }

    pub fn pending(&self) -> &Arc<PendingRequests> {
        &self.pending
    }

    pub fn controller(&self) -> &Arc<Controller> {
        &self.controller
    }
}
