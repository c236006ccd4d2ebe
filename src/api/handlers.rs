//! HTTP request handlers

use super::types::{
    BatchFailureResponse, ConversationListResponse, ConversationQuery, ErrorResponse,
    EventLogResponse, HealthResponse,
};
use super::AppState;
use crate::broker::TriggerBatch;
use crate::runtime::{process_batch, BatchError, BatchReport, StoreError};
use crate::state_machine::{ConversationState, ConversationStatus};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // Broker trigger intake
        .route("/stages/:stage", post(run_stage))
        // Read API
        .route("/conversations", get(list_conversations))
        .route("/conversations/:id", get(get_conversation))
        .route("/conversations/:id/events", get(list_events))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================
// Stage Intake
// ============================================================

async fn run_stage(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<BatchReport>, AppError> {
    let stage = state
        .stages
        .get(name.as_str())
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("Unknown stage: {name}")))?;

    let batch: TriggerBatch = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid trigger batch: {e}")))?;
    let records = batch.into_records();

    let report = process_batch(stage.as_ref(), &records).await?;
    Ok(Json(report))
}

// ============================================================
// Read API
// ============================================================

async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationState>, AppError> {
    state
        .store
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Conversation not found: {id}")))
}

async fn list_conversations(
    State(state): State<AppState>,
    Query(query): Query<ConversationQuery>,
) -> Result<Json<ConversationListResponse>, AppError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<ConversationStatus>)
        .transpose()
        .map_err(AppError::BadRequest)?;

    let conversations = match (query.correlation_id, status) {
        (Some(correlation_id), status) => {
            let mut found = state.store.find_by_correlation_id(&correlation_id).await?;
            if let Some(status) = status {
                found.retain(|c| c.status == status);
            }
            found
        }
        (None, Some(status)) => state.store.list_by_status(status).await?,
        (None, None) => {
            return Err(AppError::BadRequest(
                "Either status or correlationId is required".to_string(),
            ))
        }
    };

    Ok(Json(ConversationListResponse { conversations }))
}

async fn list_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EventLogResponse>, AppError> {
    let events = state.store.list_log_entries(&id).await?;
    if events.is_empty() && state.store.get(&id).await?.is_none() {
        return Err(AppError::NotFound(format!("Conversation not found: {id}")));
    }
    Ok(Json(EventLogResponse {
        conversation_id: id,
        events,
    }))
}

// ============================================================
// Error Handling
// ============================================================

enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
    /// Some records must be redelivered; the broker retries on any 5xx
    Redeliver(BatchError),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => AppError::NotFound(format!("Conversation not found: {id}")),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<BatchError> for AppError {
    fn from(e: BatchError) -> Self {
        AppError::Redeliver(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::Redeliver(err) => {
                let error = err.to_string();
                let BatchError::RecordsFailed { failures } = err;
                let body = Json(BatchFailureResponse { error, failures });
                return (StatusCode::INTERNAL_SERVER_ERROR, body).into_response();
            }
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
