//! HTTP API: server wiring, authentication, route gating and handlers.

pub mod app;
pub mod authz;
pub mod context;
pub mod middleware;
