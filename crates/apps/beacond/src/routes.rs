//! HTTP surface: Pub/Sub push endpoint and operator routes

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    routing::{get, post},
};
use beacon::{NotificationHandler, SyncState};
use log::error;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::AppResult;

#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<NotificationHandler>,
}

pub fn router(state: AppState, webhook_path: &str) -> Router {
    Router::new()
        .route(webhook_path, post(webhook))
        .route("/health", get(health))
        .route("/admin/resync", post(resync))
        .route("/admin/cursors", get(list_cursors))
        .with_state(state)
}

/// Acknowledge the push and process it off the async runtime
///
/// Pub/Sub redelivers anything not acknowledged with a 2xx, so the response
/// never depends on the outcome.
async fn webhook(State(state): State<AppState>, body: Bytes) -> &'static str {
    let handler = state.handler.clone();
    tokio::task::spawn_blocking(move || {
        if let Err(e) = handler.handle_payload(&body) {
            error!("Notification aborted: {}", e);
        }
    });
    "OK"
}

async fn health() -> &'static str {
    "OK"
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResyncRequest {
    pub email_address: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResyncResponse {
    pub email_address: String,
    pub history_id: String,
}

async fn resync(
    State(state): State<AppState>,
    Json(request): Json<ResyncRequest>,
) -> AppResult<Json<ResyncResponse>> {
    let handler = state.handler.clone();
    let mailbox = request.email_address.clone();
    let cursor = tokio::task::spawn_blocking(move || handler.resync(&mailbox))
        .await
        .map_err(anyhow::Error::from)??;

    Ok(Json(ResyncResponse {
        email_address: request.email_address,
        history_id: cursor.0,
    }))
}

async fn list_cursors(State(state): State<AppState>) -> AppResult<Json<Vec<SyncState>>> {
    Ok(Json(state.handler.cursors().list_sync_states()?))
}
