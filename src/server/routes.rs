//! HTTP routes for wallet operations and approval actions

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::error::Error;
use crate::ledger::{LedgerGateway, DROPS_PER_XRP};
use crate::node::Node;
use crate::pairing::{Pairing, Reason, SessionRequest, SIGN_METHOD};

#[derive(Clone)]
pub struct AppState {
    pub node: Arc<Node>,
}

type ApiResult = Result<Json<Value>, (StatusCode, String)>;

pub fn create_router(node: Arc<Node>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/wallet", post(create_wallet).get(wallet_info))
        .route("/api/balance/:address", get(balance))
        .route("/api/pairing/connect", post(pairing_connect))
        .route("/api/pairing/status", get(pairing_status))
        .route("/api/pairing/pending", get(pending_summary))
        .route("/api/pairing/pending/proposal", get(pending_proposal))
        .route("/api/pairing/pending/request", get(pending_request))
        .route("/api/pairing/proposal/approve", post(approve_proposal))
        .route("/api/pairing/proposal/reject", post(reject_proposal))
        .route("/api/pairing/request/approve", post(approve_request))
        .route("/api/pairing/request/reject", post(reject_request))
        .route("/api/pairing/disconnect", post(disconnect_all))
        .route("/api/debug/stage-request", post(stage_debug_request))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { node })
}

fn reject(err: Error) -> (StatusCode, String) {
    let status = match err {
        Error::NotFound(_) | Error::NoWallet | Error::InvalidProposal(_) => StatusCode::BAD_REQUEST,
        Error::AccountNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

#[derive(Deserialize)]
struct ConnectBody {
    uri: String,
}

#[derive(Deserialize)]
struct IdBody {
    id: u64,
}

#[derive(Deserialize, Default)]
struct DebugBody {
    #[serde(default)]
    transaction: Option<Value>,
}

async fn health(State(s): State<AppState>) -> impl IntoResponse {
    Json(json!({"status": "ok", "service": s.node.config().app}))
}

async fn create_wallet(State(s): State<AppState>) -> ApiResult {
    let identity = s.node.wallet().create(s.node.ledger().as_ref()).await.map_err(reject)?;
    Ok(Json(json!({"success": true, "wallet": identity})))
}

async fn wallet_info(State(s): State<AppState>) -> Json<Value> {
    Json(match s.node.wallet().identity() {
        Some(identity) => json!({"success": true, "wallet": {
            "hasWallet": true,
            "address": identity.address,
            "publicKey": identity.public_key,
        }}),
        None => json!({"success": true, "wallet": {"hasWallet": false}}),
    })
}

async fn balance(State(s): State<AppState>, Path(address): Path<String>) -> ApiResult {
    let info = s.node.ledger().account_info(&address).await.map_err(reject)?;
    let drops: f64 = info.balance.parse().unwrap_or(0.0);
    Ok(Json(json!({
        "success": true,
        "address": address,
        "balance": info.balance,
        "balanceXrp": drops / DROPS_PER_XRP,
    })))
}

async fn pairing_connect(State(s): State<AppState>, Json(body): Json<ConnectBody>) -> ApiResult {
    let topic = s.node.pairing().pair(&body.uri).await.map_err(reject)?;
    let sessions = s.node.pairing().sessions().await;
    Ok(Json(json!({"success": true, "topic": topic, "sessions": sessions})))
}

async fn pairing_status(State(s): State<AppState>) -> Json<Value> {
    let sessions = s.node.pairing().sessions().await;
    Json(json!({"success": true, "connected": !sessions.is_empty(), "sessions": sessions}))
}

async fn pending_summary(State(s): State<AppState>) -> Json<Value> {
    let proposal = s.node.pending().proposal().map(|(p, at)| {
        json!({
            "id": p.id,
            "proposer": p.proposer,
            "requiredNamespaces": p.required_namespaces,
            "receivedAt": at.to_rfc3339(),
        })
    });
    let request = s.node.pending().request().map(|(r, at)| {
        json!({
            "id": r.id,
            "method": r.method,
            "transaction": r.tx_json,
            "receivedAt": at.to_rfc3339(),
        })
    });
    Json(json!({"success": true, "pendingConnection": proposal, "pendingTransaction": request}))
}

async fn pending_proposal(State(s): State<AppState>) -> Json<Value> {
    Json(match s.node.pending().proposal() {
        Some((proposal, at)) => {
            json!({"success": true, "proposal": proposal, "receivedAt": at.to_rfc3339()})
        }
        None => json!({"success": false, "error": "No pending connection proposal"}),
    })
}

async fn pending_request(State(s): State<AppState>) -> Json<Value> {
    Json(match s.node.pending().request() {
        Some((request, at)) => {
            json!({"success": true, "request": request, "receivedAt": at.to_rfc3339()})
        }
        None => json!({"success": false, "error": "No pending signing request"}),
    })
}

async fn approve_proposal(State(s): State<AppState>, Json(body): Json<IdBody>) -> ApiResult {
    let accounts = s.node.controller().approve_proposal(body.id).await.map_err(reject)?;
    Ok(Json(json!({"success": true, "message": "Connection approved", "accounts": accounts})))
}

async fn reject_proposal(State(s): State<AppState>, Json(body): Json<IdBody>) -> ApiResult {
    s.node.controller().reject_proposal(body.id).await.map_err(reject)?;
    Ok(Json(json!({"success": true, "message": "Connection rejected"})))
}

async fn approve_request(State(s): State<AppState>, Json(body): Json<IdBody>) -> ApiResult {
    let signed = s.node.controller().approve_request(body.id).await.map_err(reject)?;
    Ok(Json(json!({"success": true, "message": "Transaction signed", "result": signed})))
}

async fn reject_request(State(s): State<AppState>, Json(body): Json<IdBody>) -> ApiResult {
    s.node.controller().reject_request(body.id).await.map_err(reject)?;
    Ok(Json(json!({"success": true, "message": "Transaction rejected"})))
}

async fn disconnect_all(State(s): State<AppState>) -> Json<Value> {
    let sessions = s.node.pairing().sessions().await;
    let mut closed = 0;
    for session in &sessions {
        match s.node.pairing().disconnect(&session.topic, Reason::user_disconnected()).await {
            Ok(()) => closed += 1,
            Err(e) => warn!(topic = %session.topic, "disconnect failed: {}", e),
        }
    }
    s.node.pending().clear_all();
    Json(json!({"success": true, "disconnected": closed}))
}

/// Stage a synthetic signing request, as if a dapp had sent one. Useful for
/// driving the approval flow without a live relay.
async fn stage_debug_request(
    State(s): State<AppState>,
    body: Option<Json<DebugBody>>,
) -> Json<Value> {
    let tx_json = body.and_then(|Json(b)| b.transaction).unwrap_or_else(|| {
        json!({
            "TransactionType": "Payment",
            "Destination": "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh",
            "Amount": "1000000",
        })
    });
    let topic = s
        .node
        .pairing()
        .sessions()
        .await
        .first()
        .map(|session| session.topic.clone())
        .unwrap_or_else(|| "debug".into());
    let request = SessionRequest {
        id: chrono::Utc::now().timestamp_millis() as u64,
        topic,
        method: SIGN_METHOD.into(),
        tx_json,
    };
    s.node.controller().inject_request(request.clone());
    Json(json!({"success": true, "message": "Test signing request staged", "request": request}))
}
