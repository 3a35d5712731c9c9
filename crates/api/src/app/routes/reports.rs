use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use herdbook_auth::Route;
use herdbook_infra::{Period, dose_report};

use crate::app::dto;
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::authz::authorize_route;
use crate::context::AuthContext;

/// Stock and consumption per bull; `from`/`to` bound the consumption column.
pub async fn doses(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Query(query): Query<dto::ReportQuery>,
) -> ApiResult {
    authorize_route(&services.policy, &ctx, &Route::REPORTS)?;

    let period = match (query.from, query.to) {
        (None, None) => None,
        (Some(from), Some(to)) if from <= to => Some(Period { from, to }),
        (Some(_), Some(_)) => {
            return Err(errors::json_error(StatusCode::BAD_REQUEST, "invalid_period", "from must not be after to"));
        }
        _ => {
            return Err(errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_period",
                "from and to must be given together",
            ));
        }
    };

    let farm_id = ctx.farm_id();
    let bulls = services.read_models.bulls.list(farm_id);
    let inseminations = services.read_models.inseminations.list(farm_id, false);
    Ok(Json(dose_report(&bulls, &inseminations, period)).into_response())
}
