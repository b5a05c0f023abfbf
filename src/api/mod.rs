mod error;
mod websocket;

pub use error::ApiError;

use crate::core::approval::{ApprovalManager, ApprovalRequest};
use crate::core::hub::EventHub;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

#[derive(Clone)]
pub struct AppState {
    pub hub: EventHub,
    pub approvals: ApprovalManager,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/approvals", get(list_approvals))
        .route("/api/approvals/:id", post(decide_approval))
        .route("/ws", get(websocket::ws_handler))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stats = state.hub.stats().await;
    Json(json!({
        "status": "ok",
        "connected_clients": stats.connected_clients,
    }))
}

async fn list_approvals(State(state): State<AppState>) -> Json<Vec<ApprovalRequest>> {
    Json(state.approvals.pending_approvals().await)
}

#[derive(Debug, Deserialize)]
struct DecisionBody {
    approved: bool,
    approver_id: String,
}

async fn decide_approval(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    Json(body): Json<DecisionBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .approvals
        .process_approval(&request_id, body.approved, &body.approver_id)
        .await?;

    Ok(Json(json!({
        "request_id": request_id,
        "approved": body.approved,
    })))
}
