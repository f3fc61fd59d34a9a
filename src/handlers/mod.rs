pub mod health;
pub mod session;

use crate::metrics::metrics_handler;
use crate::service::CredentialsService;
use axum::{
    Router,
    http::HeaderName,
    routing::{get, post},
};
use std::time::Duration;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub service: CredentialsService,
}

/// Build the HTTP router.
///
/// A request that outlives `request_timeout` gets 408; issuance already
/// started on its own task still completes.
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    let request_id = HeaderName::from_static("x-request-id");

    Router::new()
        .route("/", get(health::health_check))
        .route("/health", get(health::health_check))
        .route("/metrics", get(metrics_handler))
        .route("/api/v1/sessions", post(session::get_session))
        .route("/api/v1/sessions/resolve", post(session::resolve_session))
        .route("/api/v1/sessions/revoke", post(session::revoke_session))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
}
