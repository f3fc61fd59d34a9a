use crate::handlers::AppState;
use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let stored_sessions = state.service.issuer().store().len().await;

    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "credentials-api",
            "version": env!("CARGO_PKG_VERSION"),
            "stored_sessions": stored_sessions
        })),
    )
}
