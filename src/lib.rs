//! Pairnode: reference wallet node bridging dapp pairing sessions to the
//! XRP Ledger.
//!
//! # Architecture
//!
//! ```text
//! Node (application context)
//!   │
//!   ├── WalletStore (one ed25519 identity, wallet.json persistence)
//!   │
//!   ├── WsLedger (XRP Ledger WebSocket gateway + faucet funding)
//!   │
//!   ├── RelayPairing (pairing relay client)
//!   │     └── PairingEvent inbox ──▶ Controller
//!   │
//!   └── Controller (approval state machine)
//!         └── PendingRequests (one proposal slot + one request slot,
//!                              5-minute lazy expiry)
//! ```
//!
//! # Flow
//!
//! A dapp proposes a session or asks for a transaction signature over the
//! pairing relay. The controller stages the inbound item; nothing resolves
//! until the operator approves or rejects it through the HTTP facade.
//! Approving a proposal grants `"<chain>:<address>"` for the current wallet;
//! approving a signing request completes the transaction against the ledger
//! (sequence, autofill), signs it locally, and publishes the result back to
//! the session topic it came from. Staged items expire after five minutes.
//!
//! # Usage
//!
//! ```ignore
//! use pairnode::{Node, NodeConfig, create_router};
//!
//! let node = std::sync::Arc::new(Node::from_config(
//!     NodeConfig::new("pairnode").with_port(3002)
//! ));
//! node.start().await;
//! let router = create_router(node);
//! ```

pub mod approval;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod node;
pub mod pairing;
pub mod runtime;
pub mod server;
pub mod wallet;

pub use approval::{Controller, PendingRequests};
pub use error::{Error, Result};
pub use ledger::{AccountInfo, LedgerGateway, WsLedger};
pub use node::{Node, NodeConfig};
pub use pairing::{Pairing, PairingEvent, RelayPairing, SessionProposal, SessionRequest};
pub use runtime::{install_signal_handlers, Shutdown};
pub use server::create_router;
pub use wallet::{SignedTransaction, WalletIdentity, WalletStore};
