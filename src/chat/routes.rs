//! HTTP routes for submitting chat turns and polling their records.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tracing::{error, info, warn};

use super::request::ChatRequest;
use crate::error::StoreError;
use crate::state::TaskId;
use crate::store::TaskStateStore;
use crate::worker::Dispatcher;

/// Header carrying the record's remaining lifetime in milliseconds.
pub const RECORD_TTL_HEADER: &str = "x-record-ttl-ms";

/// Shared state for the chat handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<TaskStateStore>,
    pub dispatcher: Arc<dyn Dispatcher>,
}

/// Build the chat router.
pub fn chat_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chat", get(poll_chat).post(submit_chat).delete(cancel_chat))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct RecordQuery {
    request_id: String,
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "zynapse",
    }))
}

fn store_failure(e: StoreError) -> Response {
    error!(error = %e, "Record store failure");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": true, "message": e.to_string()})),
    )
        .into_response()
}

async fn submit_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Response {
    let payload = match serde_json::to_string(&request) {
        Ok(payload) => payload,
        Err(e) => return store_failure(e.into()),
    };
    let task_id = match state.store.create(None).await {
        Ok(id) => id,
        Err(e) => return store_failure(e),
    };

    if let Err(e) = state.dispatcher.enqueue(task_id.clone(), payload).await {
        warn!(task_id = %task_id, error = %e, "Chat request not dispatched");
        if let Err(cleanup) = state.store.delete(&task_id).await {
            warn!(task_id = %task_id, error = %cleanup, "Failed to remove undispatched record");
        }
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"error": true, "message": e.to_string()})),
        )
            .into_response();
    }

    info!(task_id = %task_id, page_id = %request.page_id, "Chat request accepted");
    (
        StatusCode::OK,
        Json(serde_json::json!({"request_id": task_id})),
    )
        .into_response()
}

async fn poll_chat(State(state): State<AppState>, Query(query): Query<RecordQuery>) -> Response {
    let task_id = TaskId::from(query.request_id);
    let record = match state.store.read(&task_id).await {
        Ok(Some(record)) => record,
        Ok(None) => return (StatusCode::NOT_FOUND, "Record not found").into_response(),
        Err(e) => return store_failure(e),
    };

    let mut response = (StatusCode::OK, Json(record)).into_response();
    // The lifetime is informational; a failed lookup still returns the record.
    if let Ok(Some(ttl)) = state.store.remaining_ttl(&task_id).await {
        if let Ok(value) = HeaderValue::from_str(&ttl.as_millis().to_string()) {
            response.headers_mut().insert(RECORD_TTL_HEADER, value);
        }
    }
    response
}

async fn cancel_chat(State(state): State<AppState>, Query(query): Query<RecordQuery>) -> Response {
    let task_id = TaskId::from(query.request_id);
    match state.store.request_cancel(&task_id).await {
        Ok(true) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({"request_id": task_id, "status": "cancelling"})),
        )
            .into_response(),
        Ok(false) => (StatusCode::NOT_FOUND, "Record not found").into_response(),
        Err(e) => store_failure(e),
    }
}
