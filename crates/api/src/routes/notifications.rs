//! Database-webhook route for inserted notification rows.

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use tracing::Instrument;
use uuid::Uuid;

use pushrelay_common::error::AppError;
use pushrelay_common::types::TriggerPayload;
use pushrelay_notifier::relay::RelayOutcome;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/send-notification", post(send_notification))
}

/// POST /send-notification — Fan an inserted notification out to the user's devices.
///
/// The body is parsed by hand so malformed JSON gets the same `{"error": ..}`
/// shape as every other failure.
async fn send_notification(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let payload: TriggerPayload = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Invalid JSON payload: {}", e)))?;

    let record = payload
        .record
        .ok_or_else(|| AppError::Validation("Missing record data".to_string()))?;

    let span = tracing::info_span!(
        "invocation",
        id = %Uuid::new_v4(),
        user_id = record.target_user().as_deref().unwrap_or("-")
    );

    match state.relay.relay(&record).instrument(span).await? {
        RelayOutcome::NoTokens => Ok(Json(json!({ "message": "No tokens found for user" }))),
        RelayOutcome::Dispatched(results) => Ok(Json(json!({ "results": results }))),
    }
}
