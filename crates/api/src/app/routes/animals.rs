use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use herdbook_auth::Route;
use herdbook_core::AggregateRoot;
use herdbook_herd::{Animal, AnimalId};
use herdbook_infra::NewAnimal;

use crate::app::dto;
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::authz::authorize_route;
use crate::context::AuthContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_animal).get(list_animals))
        .route("/:id", get(get_animal))
        .route("/:id/archive", post(archive_animal))
}

fn animal_json(animal: &Animal) -> serde_json::Value {
    serde_json::json!({
        "id": animal.id().to_string(),
        "ear_tag": animal.ear_tag(),
        "name": animal.name(),
        "breed": animal.breed(),
        "status": animal.status(),
    })
}

pub async fn register_animal(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Json(body): Json<dto::RegisterAnimalRequest>,
) -> ApiResult {
    authorize_route(&services.policy, &ctx, &Route::ANIMALS)?;

    let animal = services
        .herd
        .register_animal(
            ctx.farm_id(),
            NewAnimal {
                ear_tag: body.ear_tag,
                name: body.name,
                breed: body.breed,
            },
        )
        .map_err(errors::dispatch_error)?;

    Ok((StatusCode::CREATED, Json(animal_json(&animal))).into_response())
}

pub async fn list_animals(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
) -> ApiResult {
    authorize_route(&services.policy, &ctx, &Route::ANIMALS)?;
    Ok(Json(services.read_models.animals.list(ctx.farm_id())).into_response())
}

/// Animal card with its breeding history (tombstones included).
pub async fn get_animal(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authorize_route(&services.policy, &ctx, &Route::ANIMALS)?;
    let animal_id: AnimalId = id.parse().map_err(|_| errors::invalid_id("animal"))?;

    let animal = services
        .read_models
        .animals
        .get(ctx.farm_id(), &animal_id)
        .ok_or_else(|| errors::not_found("animal"))?;
    let inseminations = services
        .read_models
        .inseminations
        .for_animal(ctx.farm_id(), animal_id);

    Ok(Json(dto::AnimalCard { animal, inseminations }).into_response())
}

pub async fn archive_animal(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReasonRequest>,
) -> ApiResult {
    authorize_route(&services.policy, &ctx, &Route::ANIMALS)?;
    let animal_id: AnimalId = id.parse().map_err(|_| errors::invalid_id("animal"))?;

    let animal = services
        .herd
        .archive_animal(ctx.farm_id(), animal_id, &body.reason)
        .map_err(errors::dispatch_error)?;

    Ok(Json(animal_json(&animal)).into_response())
}
