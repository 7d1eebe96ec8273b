//! Node configuration - passed from higher layers

use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 3002;
pub const DEFAULT_LEDGER_URL: &str = "wss://s.altnet.rippletest.net:51233";
pub const DEFAULT_FAUCET_URL: &str = "https://faucet.altnet.rippletest.net/accounts";
pub const DEFAULT_RELAY_URL: &str = "wss://relay.walletconnect.com";

/// Node configuration. Higher layers construct this.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub app: String,
    pub port: u16,
    pub ledger_url: String,
    pub faucet_url: String,
    pub relay_url: String,
    pub wallet_file: Option<PathBuf>,
}

impl Default for NodeConfig {
    fn default() -> Self { Self::new("pairnode") }
}

impl NodeConfig {
    pub fn new(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            port: DEFAULT_PORT,
            ledger_url: DEFAULT_LEDGER_URL.into(),
            faucet_url: DEFAULT_FAUCET_URL.into(),
            relay_url: DEFAULT_RELAY_URL.into(),
            wallet_file: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self { self.port = port; self }
    pub fn with_ledger(mut self, url: impl Into<String>) -> Self { self.ledger_url = url.into(); self }
    pub fn with_faucet(mut self, url: impl Into<String>) -> Self { self.faucet_url = url.into(); self }
    pub fn with_relay(mut self, url: impl Into<String>) -> Self { self.relay_url = url.into(); self }
    pub fn with_wallet_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.wallet_file = Some(path.into());
        self
    }

    /// Resolved wallet file: explicit path, else the platform data dir,
    /// else the working directory.
    pub fn wallet_path(&self) -> PathBuf {
        self.wallet_file.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .map(|dir| dir.join(&self.app).join("wallet.json"))
                .unwrap_or_else(|| PathBuf::from("wallet.json"))
        })
    }
}
