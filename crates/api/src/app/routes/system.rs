use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;

use herdbook_auth::Route;
use herdbook_core::{Classify, ErrorKind};

use crate::app::dto::SessionResponse;
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::context::AuthContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Who the caller is right now and what the policy lets them reach.
pub async fn session(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
) -> impl IntoResponse {
    let access = Route::all()
        .iter()
        .map(|route| services.policy.explain(ctx.role(), route.as_str()))
        .collect();

    Json(SessionResponse {
        session_id: ctx.session_id().to_string(),
        farm_id: ctx.farm_id().to_string(),
        user_id: ctx.user_id().to_string(),
        display_name: ctx.display_name().to_string(),
        role: ctx.role(),
        access,
    })
}

pub async fn logout(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
) -> ApiResult {
    services
        .sessions
        .end(ctx.session_id(), Utc::now())
        .map_err(|e| match e.kind() {
            ErrorKind::Remote => errors::json_error(StatusCode::BAD_GATEWAY, "session_store", e.to_string()),
            _ => errors::json_error(StatusCode::CONFLICT, "session_closed", e.to_string()),
        })?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
