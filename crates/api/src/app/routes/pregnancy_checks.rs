use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use herdbook_auth::Route;
use herdbook_breeding::{InseminationId, InseminationStatus};

use crate::app::dto;
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::authz::authorize_route;
use crate::context::AuthContext;

/// Record the outcome of a pregnancy check. Doses are never touched.
pub async fn set_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::PregnancyCheckRequest>,
) -> ApiResult {
    authorize_route(&services.policy, &ctx, &Route::PREGNANCY_CHECKS)?;
    let insemination_id: InseminationId = id.parse().map_err(|_| errors::invalid_id("insemination"))?;
    let status: InseminationStatus = body
        .status
        .parse()
        .map_err(|e: herdbook_core::DomainError| {
            errors::json_error(StatusCode::BAD_REQUEST, "invalid_status", e.to_string())
        })?;

    let record = services
        .checks
        .set_status(ctx.farm_id(), insemination_id, status, ctx.user_id())
        .map_err(errors::breeding_error)?;
    Ok(Json(record).into_response())
}
