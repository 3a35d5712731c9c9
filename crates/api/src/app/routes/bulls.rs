use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use herdbook_auth::Route;
use herdbook_breeding::BullId;
use herdbook_infra::NewBull;

use crate::app::dto::{self, BullResponse};
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::authz::authorize_route;
use crate::context::AuthContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_bull).get(list_bulls))
        .route("/:id", get(get_bull).delete(remove_bull))
        .route("/:id/write-offs", post(write_off_doses))
}

fn parse_bull_id(id: &str) -> Result<BullId, axum::response::Response> {
    id.parse().map_err(|_| errors::invalid_id("bull"))
}

pub async fn register_bull(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Json(body): Json<dto::RegisterBullRequest>,
) -> ApiResult {
    authorize_route(&services.policy, &ctx, &Route::BULLS)?;

    let bull = services
        .ledger
        .register_bull(
            ctx.farm_id(),
            NewBull {
                code: body.code,
                name: body.name,
                price_per_dose: body.price_per_dose,
                initial_doses: body.initial_doses,
            },
        )
        .map_err(errors::breeding_error)?;

    Ok((StatusCode::CREATED, Json(BullResponse::from(&bull))).into_response())
}

pub async fn list_bulls(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
) -> ApiResult {
    authorize_route(&services.policy, &ctx, &Route::BULLS)?;
    Ok(Json(services.read_models.bulls.list(ctx.farm_id())).into_response())
}

pub async fn get_bull(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authorize_route(&services.policy, &ctx, &Route::BULLS)?;
    let bull_id = parse_bull_id(&id)?;

    let bull = services
        .read_models
        .bulls
        .get(ctx.farm_id(), &bull_id)
        .ok_or_else(|| errors::not_found("bull"))?;
    Ok(Json(bull).into_response())
}

/// Allowed only once the bull's stock is exhausted.
pub async fn remove_bull(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authorize_route(&services.policy, &ctx, &Route::BULLS)?;
    let bull_id = parse_bull_id(&id)?;

    services
        .ledger
        .remove_bull(ctx.farm_id(), bull_id, ctx.user_id())
        .map_err(errors::breeding_error)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn write_off_doses(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::WriteOffRequest>,
) -> ApiResult {
    authorize_route(&services.policy, &ctx, &Route::BULLS)?;
    let bull_id = parse_bull_id(&id)?;

    let bull = services
        .ledger
        .write_off_doses(ctx.farm_id(), bull_id, body.quantity, &body.reason, ctx.user_id())
        .map_err(errors::breeding_error)?;
    Ok(Json(BullResponse::from(&bull)).into_response())
}
