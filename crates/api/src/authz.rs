//! Route gating.
//!
//! Every domain handler asks the policy first, with the caller's current
//! role, before touching any service.

use axum::http::StatusCode;
use axum::response::Response;
use tracing::{debug, warn};

use herdbook_auth::{AccessPolicy, Route};

use crate::app::errors;
use crate::context::AuthContext;

pub fn authorize_route(policy: &AccessPolicy, ctx: &AuthContext, route: &Route) -> Result<(), Response> {
    let decision = policy.explain(ctx.role(), route.as_str());
    if decision.granted {
        debug!(user_id = %ctx.user_id(), role = %ctx.role(), %route, reason = ?decision.reason, "access granted");
        return Ok(());
    }

    warn!(
        farm_id = %ctx.farm_id(),
        user_id = %ctx.user_id(),
        role = %ctx.role(),
        %route,
        "access denied"
    );
    Err(errors::json_error(
        StatusCode::FORBIDDEN,
        "forbidden",
        format!("role {} may not access {}", ctx.role(), route),
    ))
}
