//! Liveness endpoint.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// Reports liveness and whether a service account is loaded. Without one,
/// every invocation that finds tokens fails with a 500.
async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "push-relay",
        "firebase_configured": state.relay.has_service_account(),
    }))
}
