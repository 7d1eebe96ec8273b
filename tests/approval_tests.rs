//! Integration tests: pending-request lifecycle and signing handoff
//!
//! These tests verify:
//! 1. Last-write-wins staging and id-guarded resolution
//! 2. Lazy 5-minute expiry
//! 3. Approve/reject idempotence
//! 4. The signing handoff (sequence fetch, autofill, publish, clear)
//! 5. Failure paths that must leave slots staged
//!
//! Everything runs against in-memory gateway and pairing doubles.

use async_trait::async_trait;
use pairnode::approval::{Controller, PendingRequests};
use pairnode::error::{Error, Result};
use pairnode::ledger::{AccountInfo, LedgerGateway};
use pairnode::pairing::{
    Pairing, PairingEvent, Reason, RpcReply, SessionInfo, SessionNamespace, SessionProposal,
    SessionRequest, SIGN_METHOD,
};
use pairnode::wallet::keys::Keypair;
use pairnode::wallet::{WalletIdentity, WalletStore};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ============================================================================
// Doubles
// ============================================================================

struct FakeLedger {
    sequence: u32,
    available: bool,
    account_info_calls: Mutex<u32>,
    autofill_calls: Mutex<u32>,
}

impl FakeLedger {
    fn new(sequence: u32) -> Self {
        Self {
            sequence,
            available: true,
            account_info_calls: Mutex::new(0),
            autofill_calls: Mutex::new(0),
        }
    }

    fn down() -> Self {
        Self { available: false, ..Self::new(0) }
    }
}

#[async_trait]
impl LedgerGateway for FakeLedger {
    async fn account_info(&self, address: &str) -> Result<AccountInfo> {
        if !self.available {
            return Err(Error::LedgerUnavailable("gateway down".into()));
        }
        let _ = address;
        *self.account_info_calls.lock().unwrap() += 1;
        Ok(AccountInfo { sequence: self.sequence, balance: "10000000".into() })
    }

    async fn autofill(&self, mut tx: Value) -> Result<Value> {
        if !self.available {
            return Err(Error::LedgerUnavailable("gateway down".into()));
        }
        *self.autofill_calls.lock().unwrap() += 1;
        if tx.get("LastLedgerSequence").is_none() {
            tx["LastLedgerSequence"] = json!(7_654_321);
        }
        Ok(tx)
    }

    async fn fund_new_account(&self) -> Result<WalletIdentity> {
        Ok(WalletIdentity::from_keypair(&Keypair::generate()))
    }
}

#[derive(Default)]
struct FakePairing {
    fail_approve: bool,
    replies: Mutex<Vec<(String, Value)>>,
    approvals: Mutex<Vec<(u64, BTreeMap<String, SessionNamespace>)>>,
    rejections: Mutex<Vec<u64>>,
}

#[async_trait]
impl Pairing for FakePairing {
    async fn pair(&self, _uri: &str) -> Result<String> {
        Ok("topic".into())
    }

    async fn sessions(&self) -> Vec<SessionInfo> {
        Vec::new()
    }

    async fn approve_session(
        &self,
        id: u64,
        namespaces: BTreeMap<String, SessionNamespace>,
    ) -> Result<()> {
        if self.fail_approve {
            return Err(Error::Pairing("relay down".into()));
        }
        self.approvals.lock().unwrap().push((id, namespaces));
        Ok(())
    }

    async fn reject_session(&self, id: u64, _reason: Reason) -> Result<()> {
        self.rejections.lock().unwrap().push(id);
        Ok(())
    }

    async fn respond(&self, topic: &str, reply: RpcReply) -> Result<()> {
        self.replies.lock().unwrap().push((topic.to_string(), reply.to_json()));
        Ok(())
    }

    async fn disconnect(&self, _topic: &str, _reason: Reason) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    pending: Arc<PendingRequests>,
    wallet: Arc<WalletStore>,
    ledger: Arc<FakeLedger>,
    pairing: Arc<FakePairing>,
    controller: Arc<Controller>,
    _dir: TempDir,
}

fn harness(pending: PendingRequests, ledger: FakeLedger, pairing: FakePairing) -> Harness {
    let dir = TempDir::new().expect("tempdir");
    let pending = Arc::new(pending);
    let wallet = Arc::new(WalletStore::new(dir.path().join("wallet.json")));
    let ledger = Arc::new(ledger);
    let pairing = Arc::new(pairing);
    let controller = Arc::new(Controller::new(
        pending.clone(),
        wallet.clone(),
        ledger.clone() as Arc<dyn LedgerGateway>,
        pairing.clone() as Arc<dyn Pairing>,
    ));
    Harness { pending, wallet, ledger, pairing, controller, _dir: dir }
}

async fn harness_with_wallet(
    pending: PendingRequests,
    ledger: FakeLedger,
    pairing: FakePairing,
) -> Harness {
    let h = harness(pending, ledger, pairing);
    h.wallet.create(h.ledger.as_ref()).await.expect("wallet");
    h
}

fn proposal(id: u64, required: Value, optional: Value) -> SessionProposal {
    serde_json::from_value(json!({
        "id": id,
        "proposer": {"name": "demo dapp"},
        "requiredNamespaces": required,
        "optionalNamespaces": optional,
    }))
    .expect("proposal")
}

fn payment_request(id: u64, topic: &str) -> SessionRequest {
    SessionRequest {
        id,
        topic: topic.into(),
        method: SIGN_METHOD.into(),
        tx_json: json!({
            "TransactionType": "Payment",
            "Destination": "rBOBqkCCeUREzzKtiTKg5FyhMDMEoC8cE5",
            "Amount": "1000000",
        }),
    }
}

// ============================================================================
// Lifecycle properties
// ============================================================================

/// Test: staging B after A makes only B resolvable
#[test]
fn staging_is_last_write_wins() {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    rt.block_on(async {
        let h = harness_with_wallet(
            PendingRequests::new(),
            FakeLedger::new(1),
            FakePairing::default(),
        )
        .await;

        let ns = json!({"xrpl": {"chains": ["xrpl:1"], "methods": []}});
        h.pending.stage_proposal(proposal(1, ns.clone(), json!({})));
        h.pending.stage_proposal(proposal(2, ns, json!({})));

        match h.controller.approve_proposal(1).await {
            Err(Error::NotFound(1)) => {}
            other => panic!("expected NotFound, got {:?}", other),
        }

        let accounts = h.controller.approve_proposal(2).await.expect("approve");
        assert_eq!(accounts.len(), 1);
        assert!(h.pending.proposal().is_none(), "slot cleared after approval");
    });
}

/// Test: an expired request resolves as NotFound
#[test]
fn expired_request_is_gone() {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    rt.block_on(async {
        let h = harness_with_wallet(
            PendingRequests::with_ttl(chrono::Duration::zero()),
            FakeLedger::new(1),
            FakePairing::default(),
        )
        .await;

        h.pending.stage_request(payment_request(9, "sess"));

        match h.controller.approve_request(9).await {
            Err(Error::NotFound(9)) => {}
            other => panic!("expected NotFound, got {:?}", other.map(|s| s.hash)),
        }
        assert!(h.pairing.replies.lock().unwrap().is_empty());
    });
}

/// Test: reject succeeds once, then NotFound
#[test]
fn reject_is_idempotent() {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    rt.block_on(async {
        let h = harness_with_wallet(
            PendingRequests::new(),
            FakeLedger::new(1),
            FakePairing::default(),
        )
        .await;

        h.pending.stage_request(payment_request(5, "sess"));
        h.controller.reject_request(5).await.expect("first reject");

        match h.controller.reject_request(5).await {
            Err(Error::NotFound(5)) => {}
            other => panic!("expected NotFound, got {:?}", other),
        }

        // The dapp saw exactly one rejection, keyed to the request id.
        let replies = h.pairing.replies.lock().unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].1["id"], 5);
        assert_eq!(replies[0].1["error"]["code"], -32001);
    });
}

// ============================================================================
// Signing handoff
// ============================================================================

/// Test: happy path - sequence fetch, autofill, signed blob, publish, clear
#[test]
fn signing_happy_path() {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    rt.block_on(async {
        let h = harness_with_wallet(
            PendingRequests::new(),
            FakeLedger::new(42),
            FakePairing::default(),
        )
        .await;

        h.pending.stage_request(payment_request(777, "sess-1"));
        let signed = h.controller.approve_request(777).await.expect("approve");

        // (a) sequence came from the gateway
        assert_eq!(*h.ledger.account_info_calls.lock().unwrap(), 1);
        assert_eq!(signed.tx_json["Sequence"], 42);
        // (b) autofill ran
        assert_eq!(*h.ledger.autofill_calls.lock().unwrap(), 1);
        assert_eq!(signed.tx_json["LastLedgerSequence"], 7_654_321);
        // default fee applied during merge
        assert_eq!(signed.tx_json["Fee"], "12");
        // (c) a signed blob exists
        assert!(!signed.tx_blob.is_empty());
        assert!(!signed.tx_json["TxnSignature"].as_str().unwrap().is_empty());
        // (d) the slot is cleared
        assert!(h.pending.request().is_none());
        // (e) the success response went to the originating topic, keyed to id
        let replies = h.pairing.replies.lock().unwrap();
        assert_eq!(replies.len(), 1);
        let (topic, reply) = &replies[0];
        assert_eq!(topic, "sess-1");
        assert_eq!(reply["id"], 777);
        assert_eq!(
            reply["result"]["signedTransaction"]["tx_blob"].as_str().unwrap(),
            signed.tx_blob
        );
    });
}

/// Test: a caller-supplied sequence skips the gateway lookup
#[test]
fn caller_sequence_is_respected() {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    rt.block_on(async {
        let h = harness_with_wallet(
            PendingRequests::new(),
            FakeLedger::new(42),
            FakePairing::default(),
        )
        .await;

        let mut request = payment_request(3, "sess");
        request.tx_json["Sequence"] = json!(9);
        request.tx_json["Fee"] = json!("24");
        h.pending.stage_request(request);

        let signed = h.controller.approve_request(3).await.expect("approve");
        assert_eq!(*h.ledger.account_info_calls.lock().unwrap(), 0);
        assert_eq!(signed.tx_json["Sequence"], 9);
        assert_eq!(signed.tx_json["Fee"], "24");
    });
}

/// Test: no wallet means NoWallet, slot stays staged, dapp hears nothing
#[test]
fn signing_without_wallet_leaves_slot_staged() {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    rt.block_on(async {
        let h = harness(PendingRequests::new(), FakeLedger::new(42), FakePairing::default());

        h.pending.stage_request(payment_request(8, "sess"));

        match h.controller.approve_request(8).await {
            Err(Error::NoWallet) => {}
            other => panic!("expected NoWallet, got {:?}", other.map(|s| s.hash)),
        }
        assert_eq!(h.pending.request_with_id(8).expect("still staged").id, 8);
        assert!(h.pairing.replies.lock().unwrap().is_empty());
    });
}

/// Test: a gateway failure reports -32000 to the dapp and keeps the slot
#[test]
fn ledger_failure_reports_error_and_keeps_slot() {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    rt.block_on(async {
        let dir = TempDir::new().expect("tempdir");
        let pending = Arc::new(PendingRequests::new());
        let wallet = Arc::new(WalletStore::new(dir.path().join("wallet.json")));
        // Fund against a healthy gateway, then sign against a dead one.
        wallet.create(&FakeLedger::new(1)).await.expect("wallet");

        let ledger = Arc::new(FakeLedger::down());
        let pairing = Arc::new(FakePairing::default());
        let controller = Controller::new(
            pending.clone(),
            wallet,
            ledger as Arc<dyn LedgerGateway>,
            pairing.clone() as Arc<dyn Pairing>,
        );

        pending.stage_request(payment_request(11, "sess-x"));

        match controller.approve_request(11).await {
            Err(Error::LedgerUnavailable(_)) => {}
            other => panic!("expected LedgerUnavailable, got {:?}", other.map(|s| s.hash)),
        }

        // Slot staged for a manual retry.
        assert_eq!(pending.request_with_id(11).expect("still staged").id, 11);

        // The dapp got a protocol-level failure on the same topic.
        let replies = pairing.replies.lock().unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].0, "sess-x");
        assert_eq!(replies[0].1["error"]["code"], -32000);
    });
}

// ============================================================================
// Proposal approval
// ============================================================================

/// Test: account string is "<chain>:<address>" from the required namespace
#[test]
fn approved_account_string_construction() {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    rt.block_on(async {
        let h = harness_with_wallet(
            PendingRequests::new(),
            FakeLedger::new(1),
            FakePairing::default(),
        )
        .await;
        let address = h.wallet.address().expect("address");

        let required = json!({"xrpl": {
            "chains": ["xrpl:1"],
            "methods": ["xrpl_signTransaction"],
        }});
        h.pending.stage_proposal(proposal(21, required, json!({})));

        let accounts = h.controller.approve_proposal(21).await.expect("approve");
        assert_eq!(accounts, vec![format!("xrpl:1:{}", address)]);

        let approvals = h.pairing.approvals.lock().unwrap();
        assert_eq!(approvals.len(), 1);
        let (id, namespaces) = &approvals[0];
        assert_eq!(*id, 21);
        let granted = &namespaces["xrpl"];
        assert_eq!(granted.accounts, vec![format!("xrpl:1:{}", address)]);
        assert_eq!(granted.methods, vec!["xrpl_signTransaction"]);
        assert!(granted.events.is_empty());
    });
}

/// Test: optional namespaces are checked before required
#[test]
fn optional_namespace_takes_precedence() {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    rt.block_on(async {
        let h = harness_with_wallet(
            PendingRequests::new(),
            FakeLedger::new(1),
            FakePairing::default(),
        )
        .await;
        let address = h.wallet.address().expect("address");

        let required = json!({"xrpl": {"chains": ["xrpl:1"], "methods": []}});
        let optional = json!({"xrpl": {"chains": ["xrpl:0"], "methods": []}});
        h.pending.stage_proposal(proposal(4, required, optional));

        let accounts = h.controller.approve_proposal(4).await.expect("approve");
        assert_eq!(accounts, vec![format!("xrpl:0:{}", address)]);
    });
}

/// Test: empty chain list fails InvalidProposal, slot untouched
#[test]
fn empty_chain_list_is_invalid() {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    rt.block_on(async {
        let h = harness_with_wallet(
            PendingRequests::new(),
            FakeLedger::new(1),
            FakePairing::default(),
        )
        .await;

        h.pending.stage_proposal(proposal(6, json!({"xrpl": {"chains": []}}), json!({})));

        match h.controller.approve_proposal(6).await {
            Err(Error::InvalidProposal(_)) => {}
            other => panic!("expected InvalidProposal, got {:?}", other),
        }
        assert_eq!(h.pending.proposal_with_id(6).expect("still staged").id, 6);
    });
}

/// Test: approving a proposal with no wallet fails instead of substituting
/// a placeholder address
#[test]
fn proposal_approval_without_wallet_fails() {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    rt.block_on(async {
        let h = harness(PendingRequests::new(), FakeLedger::new(1), FakePairing::default());

        let ns = json!({"xrpl": {"chains": ["xrpl:1"], "methods": []}});
        h.pending.stage_proposal(proposal(30, ns, json!({})));

        match h.controller.approve_proposal(30).await {
            Err(Error::NoWallet) => {}
            other => panic!("expected NoWallet, got {:?}", other),
        }
        assert!(h.pairing.approvals.lock().unwrap().is_empty());
        assert_eq!(h.pending.proposal_with_id(30).expect("still staged").id, 30);
    });
}

/// Test: a failed downstream approval leaves the proposal staged
#[test]
fn failed_session_approval_keeps_slot() {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    rt.block_on(async {
        let pairing = FakePairing { fail_approve: true, ..FakePairing::default() };
        let h = harness_with_wallet(PendingRequests::new(), FakeLedger::new(1), pairing).await;

        let ns = json!({"xrpl": {"chains": ["xrpl:1"], "methods": []}});
        h.pending.stage_proposal(proposal(13, ns, json!({})));

        match h.controller.approve_proposal(13).await {
            Err(Error::Pairing(_)) => {}
            other => panic!("expected Pairing error, got {:?}", other),
        }
        assert_eq!(h.pending.proposal_with_id(13).expect("still staged").id, 13);
    });
}

// ============================================================================
// Inbox
// ============================================================================

/// Test: the inbox stages proposals and signing requests, drops the rest
#[test]
fn inbox_stages_and_filters() {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    rt.block_on(async {
        let h = harness_with_wallet(
            PendingRequests::new(),
            FakeLedger::new(1),
            FakePairing::default(),
        )
        .await;

        let (tx, rx) = tokio::sync::mpsc::channel(8);
        let handle = h.controller.clone().spawn_inbox(rx);

        let ns = json!({"xrpl": {"chains": ["xrpl:1"], "methods": []}});
        tx.send(PairingEvent::Proposal(proposal(1, ns, json!({})))).await.unwrap();
        tx.send(PairingEvent::Request(payment_request(2, "sess"))).await.unwrap();
        tx.send(PairingEvent::Request(SessionRequest {
            id: 3,
            topic: "sess".into(),
            method: "xrpl_signMessage".into(),
            tx_json: json!({}),
        }))
        .await
        .unwrap();
        drop(tx);
        handle.await.expect("inbox task");

        assert_eq!(h.pending.proposal().expect("proposal staged").0.id, 1);
        // The unsupported method was dropped, not staged over the request.
        assert_eq!(h.pending.request().expect("request staged").0.id, 2);
    });
}
