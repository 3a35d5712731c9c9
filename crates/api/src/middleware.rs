use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::{info, warn};

use herdbook_auth::{JwtValidator, SessionError, SessionRegistry};
use herdbook_core::Classify;
use herdbook_infra::UserDirectory;

use crate::app::errors;
use crate::context::AuthContext;

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
    pub sessions: Arc<SessionRegistry>,
    pub directory: Arc<dyn UserDirectory>,
}

/// Token → open session → current directory entry.
///
/// Unknown, deleted or logged-out callers get 401; a known but deactivated
/// account gets 403.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let now = Utc::now();
    let token = extract_bearer(req.headers())
        .map_err(|_| errors::json_error(StatusCode::UNAUTHORIZED, "unauthenticated", "bearer token required"))?;

    let claims = state
        .jwt
        .validate(token, now)
        .map_err(|e| errors::json_error(StatusCode::UNAUTHORIZED, "invalid_token", e.to_string()))?;

    state.sessions.touch(&claims, now).map_err(session_error)?;

    let entry = state
        .directory
        .lookup(claims.farm_id, claims.sub)
        .map_err(|e| errors::json_error(StatusCode::BAD_GATEWAY, "directory_unavailable", e.to_string()))?
        .ok_or_else(|| errors::json_error(StatusCode::UNAUTHORIZED, "unknown_user", "user does not exist"))?;

    if !entry.active {
        warn!(farm_id = %claims.farm_id, user_id = %claims.sub, "request from deactivated account");
        return Err(errors::json_error(StatusCode::FORBIDDEN, "account_inactive", "account is deactivated"));
    }

    req.extensions_mut().insert(AuthContext::new(
        claims.farm_id,
        claims.sub,
        entry.display_name,
        entry.role,
        claims.sid,
    ));

    Ok(next.run(req).await)
}

/// One log line per request with its outcome.
pub async fn trace_requests(req: axum::http::Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = std::time::Instant::now();

    let response = next.run(req).await;

    info!(
        %method,
        %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    response
}

fn session_error(err: SessionError) -> Response {
    match err.kind() {
        herdbook_core::ErrorKind::Authorization => {
            errors::json_error(StatusCode::UNAUTHORIZED, "session_closed", err.to_string())
        }
        kind => errors::json_error(errors::status_for(kind), "session_store", err.to_string()),
    }
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(token)
}
