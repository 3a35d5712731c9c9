use axum::{
    routing::{get, post, put},
    Router,
};

pub mod animals;
pub mod bulls;
pub mod inseminations;
pub mod pregnancy_checks;
pub mod reports;
pub mod system;
pub mod users;

/// Router for all authenticated (farm-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/session", get(system::session))
        .route("/session/logout", post(system::logout))
        .nest("/animals", animals::router())
        .nest("/bulls", bulls::router())
        .nest("/inseminations", inseminations::router())
        .route("/pregnancy-checks/:id", put(pregnancy_checks::set_status))
        .route("/reports/doses", get(reports::doses))
        .nest("/users", users::router())
}
