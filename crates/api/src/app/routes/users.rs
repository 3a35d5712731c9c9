use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, post},
    Json, Router,
};
use chrono::Utc;
use tracing::warn;

use herdbook_auth::{Route, User};
use herdbook_core::{AggregateRoot, UserId};

use crate::app::dto;
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::authz::authorize_route;
use crate::context::AuthContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_user).get(list_users))
        .route("/:id", delete(delete_user))
        .route("/:id/role", post(change_role))
        .route("/:id/deactivate", post(deactivate_user))
        .route("/:id/activate", post(activate_user))
}

fn user_json(user: &User) -> serde_json::Value {
    serde_json::json!({
        "id": user.id().to_string(),
        "display_name": user.display_name(),
        "role": user.role(),
        "status": user.status().to_string(),
    })
}

fn parse_user_id(id: &str) -> Result<UserId, axum::response::Response> {
    id.parse().map_err(|_| errors::invalid_id("user"))
}

pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
) -> ApiResult {
    authorize_route(&services.policy, &ctx, &Route::USERS)?;
    Ok(Json(services.read_models.users.list(ctx.farm_id())).into_response())
}

pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Json(body): Json<dto::CreateUserRequest>,
) -> ApiResult {
    authorize_route(&services.policy, &ctx, &Route::USERS)?;
    let role = dto::parse_role(&body.role)?;

    let user = services
        .accounts
        .create_user(ctx.farm_id(), &body.display_name, role)
        .map_err(errors::dispatch_error)?;
    Ok((StatusCode::CREATED, Json(user_json(&user))).into_response())
}

/// Takes effect on the user's next request; open sessions stay open.
pub async fn change_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ChangeRoleRequest>,
) -> ApiResult {
    authorize_route(&services.policy, &ctx, &Route::USERS)?;
    let user_id = parse_user_id(&id)?;
    let role = dto::parse_role(&body.role)?;

    let user = services
        .accounts
        .change_role(ctx.farm_id(), user_id, role, ctx.user_id())
        .map_err(errors::dispatch_error)?;
    Ok(Json(user_json(&user)).into_response())
}

/// Refused from the next request on; reactivation restores access.
pub async fn deactivate_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authorize_route(&services.policy, &ctx, &Route::USERS)?;
    let user_id = parse_user_id(&id)?;

    let user = services
        .accounts
        .deactivate(ctx.farm_id(), user_id, ctx.user_id())
        .map_err(errors::dispatch_error)?;
    Ok(Json(user_json(&user)).into_response())
}

pub async fn activate_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authorize_route(&services.policy, &ctx, &Route::USERS)?;
    let user_id = parse_user_id(&id)?;

    let user = services
        .accounts
        .activate(ctx.farm_id(), user_id)
        .map_err(errors::dispatch_error)?;
    Ok(Json(user_json(&user)).into_response())
}

/// Irreversible. Ends every session of the user.
pub async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authorize_route(&services.policy, &ctx, &Route::USERS)?;
    let user_id = parse_user_id(&id)?;

    services
        .accounts
        .delete(ctx.farm_id(), user_id, ctx.user_id())
        .map_err(errors::dispatch_error)?;

    if let Err(e) = services.sessions.end_all_for(user_id, Utc::now()) {
        warn!(%user_id, error = %e, "sessions of deleted user not ended");
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}
