//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: event store/bus, read models, ledger and account services
//! - `routes/`: handlers, one file per route family
//! - `dto.rs`: request/response bodies and parsing helpers
//! - `errors.rs`: error kinds → status codes and JSON bodies

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use herdbook_config::AppConfig;
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: AppConfig) -> anyhow::Result<Router> {
    let services = Arc::new(services::build_services(&config).await?);
    Ok(router_with(services, &config))
}

/// Router over already-built services; tests keep a handle on `services`.
pub fn router_with(services: Arc<services::AppServices>, config: &AppConfig) -> Router {
    let jwt = Arc::new(
        herdbook_auth::Hs256JwtValidator::new(config.auth.jwt_secret.as_bytes())
            .with_leeway(config.auth.leeway_secs),
    );
    let auth_state = middleware::AuthState {
        jwt,
        sessions: services.sessions.clone(),
        directory: Arc::new(services.accounts.clone()),
    };

    // Expired sessions are dropped at start-up; the registry keeps the rest.
    if let Err(e) = services.sessions.prune(chrono::Utc::now()) {
        tracing::warn!(error = %e, "could not prune expired sessions");
    }

    let protected = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new().layer(axum::middleware::from_fn(middleware::trace_requests)))
}
