use crate::error::ServiceError;
use crate::handlers::AppState;
use crate::models::{
    ErrorResponse, GetSessionRequest, ResolveSessionResponse, SessionResponse, TokenRequest,
};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

const REQUEST_ID_HEADER: &str = "x-request-id";

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServiceError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ServiceError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::NotFound => StatusCode::NOT_FOUND,
            ServiceError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let retry_after = self.retry_after_secs();
        let body = Json(ErrorResponse {
            error: self.kind().to_string(),
            error_description: self.to_string(),
            retry_after,
        });

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after
            && let Ok(value) = HeaderValue::from_str(&secs.to_string())
        {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}

/// Malformed or mistyped bodies are reported as `invalid_argument`
fn invalid_body(rejection: JsonRejection) -> ServiceError {
    ServiceError::InvalidArgument(rejection.body_text())
}

fn request_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
}

/// POST /api/v1/sessions
pub async fn get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<GetSessionRequest>, JsonRejection>,
) -> Result<Json<SessionResponse>, ServiceError> {
    let Json(payload) = payload.map_err(invalid_body)?;
    let response = state
        .service
        .get_session(&payload.user_id, request_id(&headers))
        .await?;
    Ok(Json(response))
}

/// POST /api/v1/sessions/resolve
pub async fn resolve_session(
    State(state): State<AppState>,
    payload: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<ResolveSessionResponse>, ServiceError> {
    let Json(payload) = payload.map_err(invalid_body)?;
    let response = state.service.resolve_session(&payload.token).await?;
    Ok(Json(response))
}

/// POST /api/v1/sessions/revoke
pub async fn revoke_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<StatusCode, ServiceError> {
    let Json(payload) = payload.map_err(invalid_body)?;
    state
        .service
        .revoke_session(&payload.token, request_id(&headers))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
