//! Approval controller - the pending-request lifecycle.
//!
//! Inbound proposals and signing requests arrive on a bounded inbox and are
//! staged in [`PendingRequests`]. Nothing is resolved automatically: the
//! operator approves or rejects by id, and the controller drives the
//! session-namespace approval or the signing handoff, replying over the
//! pairing channel. Slots are cleared only after the downstream call
//! succeeds; a failed approval leaves the slot staged for a manual retry.

pub mod pending;

pub use pending::PendingRequests;

use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::ledger::{LedgerGateway, DEFAULT_FEE_DROPS};
use crate::pairing::{
    Pairing, PairingEvent, Reason, RpcReply, SessionNamespace, SessionRequest, CHAIN_NAMESPACE,
    ERR_REQUEST_FAILED, ERR_USER_REJECTED, SIGN_METHOD,
};
use crate::wallet::{SignedTransaction, WalletStore};

pub struct Controller {
    pending: Arc<PendingRequests>,
    wallet: Arc<WalletStore>,
    ledger: Arc<dyn LedgerGateway>,
    pairing: Arc<dyn Pairing>,
}

impl Controller {
    pub fn new(
        pending: Arc<PendingRequests>,
        wallet: Arc<WalletStore>,
        ledger: Arc<dyn LedgerGateway>,
        pairing: Arc<dyn Pairing>,
    ) -> Self {
        Self { pending, wallet, ledger, pairing }
    }

    /// Consume the pairing inbox, staging whatever arrives. Single consumer;
    /// staging is last-write-wins per kind.
    pub fn spawn_inbox(self: Arc<Self>, mut rx: mpsc::Receiver<PairingEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                self.handle_event(event);
            }
        })
    }

    fn handle_event(&self, event: PairingEvent) {
        match event {
            PairingEvent::Proposal(proposal) => {
                info!(id = proposal.id, proposer = %proposal.proposer.name, "connection proposal staged");
                self.pending.stage_proposal(proposal);
            }
            PairingEvent::Request(request) if request.method == SIGN_METHOD => {
                info!(id = request.id, topic = %request.topic, "signing request staged");
                self.pending.stage_request(request);
            }
            PairingEvent::Request(request) => {
                info!(id = request.id, method = %request.method, "dropping unsupported session request");
            }
            PairingEvent::SessionDeleted { topic } => {
                info!(%topic, "session deleted by peer");
            }
        }
    }

    /// Stage a synthetic signing request as if it had arrived on the inbox.
    /// Non-signing methods are dropped the same way inbox traffic is.
    pub fn inject_request(&self, request: SessionRequest) {
        self.handle_event(PairingEvent::Request(request));
    }

    /// Approve the staged proposal: grant the requested chain's account and
    /// echo back the methods the dapp asked for.
    pub async fn approve_proposal(&self, id: u64) -> Result<Vec<String>> {
        let proposal = self.pending.proposal_with_id(id)?;

        let namespace = proposal
            .optional_namespaces
            .get(CHAIN_NAMESPACE)
            .or_else(|| proposal.required_namespaces.get(CHAIN_NAMESPACE))
            .ok_or_else(|| Error::InvalidProposal(format!("no {} namespace", CHAIN_NAMESPACE)))?;
        let chain = namespace
            .chains
            .first()
            .ok_or_else(|| Error::InvalidProposal("empty chain list".into()))?;
        let address = self.wallet.address().ok_or(Error::NoWallet)?;
        let account = format!("{}:{}", chain, address);

        let mut namespaces = BTreeMap::new();
        namespaces.insert(
            CHAIN_NAMESPACE.to_string(),
            SessionNamespace {
                accounts: vec![account.clone()],
                methods: namespace.methods.clone(),
                events: Vec::new(),
            },
        );

        self.pairing.approve_session(id, namespaces).await?;
        self.pending.clear_proposal_if(id);
        info!(id, %account, "connection proposal approved");
        Ok(vec![account])
    }

    pub async fn reject_proposal(&self, id: u64) -> Result<()> {
        self.pending.proposal_with_id(id)?;
        self.pairing.reject_session(id, Reason::user_rejected()).await?;
        self.pending.clear_proposal_if(id);
        info!(id, "connection proposal rejected");
        Ok(())
    }

    /// Approve the staged signing request: complete, sign, and publish the
    /// result to the request's own topic. On failure the dapp gets an error
    /// response and the slot stays staged.
    pub async fn approve_request(&self, id: u64) -> Result<SignedTransaction> {
        let request = self.pending.request_with_id(id)?;
        let address = self.wallet.address().ok_or(Error::NoWallet)?;

        match self.sign_and_publish(&request, &address).await {
            Ok(signed) => {
                self.pending.clear_request_if(id);
                info!(id, hash = %signed.hash, "signing request approved");
                Ok(signed)
            }
            Err(err) => {
                let reply = RpcReply::Error {
                    id: request.id,
                    code: ERR_REQUEST_FAILED,
                    message: err.to_string(),
                };
                if let Err(publish_err) = self.pairing.respond(&request.topic, reply).await {
                    warn!(id, "could not report signing failure: {}", publish_err);
                }
                Err(err)
            }
        }
    }

    pub async fn reject_request(&self, id: u64) -> Result<()> {
        let request = self.pending.request_with_id(id)?;
        let reply = RpcReply::Error {
            id: request.id,
            code: ERR_USER_REJECTED,
            message: "User rejected the transaction".into(),
        };
        self.pairing.respond(&request.topic, reply).await?;
        self.pending.clear_request_if(id);
        info!(id, "signing request rejected");
        Ok(())
    }

    async fn sign_and_publish(
        &self,
        request: &SessionRequest,
        address: &str,
    ) -> Result<SignedTransaction> {
        if !request.tx_json.is_object() {
            return Err(Error::Keys("transaction payload must be a JSON object".into()));
        }

        let mut tx = request.tx_json.clone();
        if tx.get("Fee").is_none() {
            tx["Fee"] = json!(DEFAULT_FEE_DROPS);
        }
        if tx.get("Account").is_none() {
            tx["Account"] = json!(address);
        }
        if tx.get("Sequence").is_none() {
            tx["Sequence"] = json!(self.ledger.account_info(address).await?.sequence);
        }

        let tx = self.ledger.autofill(tx).await?;
        let signed = self.wallet.sign(&tx)?;

        let reply = RpcReply::Result {
            id: request.id,
            result: json!({"signedTransaction": {
                "tx_blob": signed.tx_blob,
                "hash": signed.hash,
            }}),
        };
        self.pairing.respond(&request.topic, reply).await?;
        Ok(signed)
    }
}
