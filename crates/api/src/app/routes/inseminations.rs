use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use herdbook_auth::Route;
use herdbook_breeding::{BullId, InseminationId};
use herdbook_herd::AnimalId;
use herdbook_infra::RecordInsemination;

use crate::app::dto;
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::authz::authorize_route;
use crate::context::AuthContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(record_insemination).get(list_inseminations))
        .route("/:id/reverse", post(reverse_insemination))
}

/// One breeding session over several animals; one dose per distinct animal.
pub async fn record_insemination(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Json(body): Json<dto::RecordInseminationRequest>,
) -> ApiResult {
    authorize_route(&services.policy, &ctx, &Route::INSEMINATIONS)?;

    let bull_id: BullId = body.bull_id.parse().map_err(|_| errors::invalid_id("bull"))?;
    let animals: BTreeSet<AnimalId> = dto::parse_animal_ids(&body.animal_ids)?.into_iter().collect();

    let records = services
        .ledger
        .record_insemination(
            ctx.farm_id(),
            RecordInsemination {
                bull_id,
                animals,
                executor_id: body.executor_id.unwrap_or(ctx.user_id()),
                date: body.date,
                time: body.time,
            },
        )
        .map_err(errors::breeding_error)?;

    Ok((
        StatusCode::CREATED,
        Json(dto::RecordedInseminations { inseminations: records }),
    )
        .into_response())
}

/// Breeding journal, newest first. Tombstones only on request.
pub async fn list_inseminations(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Query(query): Query<dto::InseminationQuery>,
) -> ApiResult {
    authorize_route(&services.policy, &ctx, &Route::INSEMINATIONS)?;

    let journal = &services.read_models.inseminations;
    let rows: Vec<_> = match query.animal_id.as_deref() {
        Some(raw) => {
            let animal_id: AnimalId = raw.parse().map_err(|_| errors::invalid_id("animal"))?;
            journal
                .for_animal(ctx.farm_id(), animal_id)
                .into_iter()
                .filter(|r| query.include_deleted || r.is_active())
                .collect()
        }
        None => journal.list(ctx.farm_id(), query.include_deleted),
    };
    Ok(Json(rows).into_response())
}

pub async fn reverse_insemination(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReasonRequest>,
) -> ApiResult {
    authorize_route(&services.policy, &ctx, &Route::INSEMINATIONS)?;
    let insemination_id: InseminationId = id.parse().map_err(|_| errors::invalid_id("insemination"))?;

    let record = services
        .ledger
        .reverse_insemination(ctx.farm_id(), insemination_id, &body.reason, ctx.user_id())
        .map_err(errors::breeding_error)?;
    Ok(Json(record).into_response())
}
