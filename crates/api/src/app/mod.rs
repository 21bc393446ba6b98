//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store backend selection and shared handles
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request bodies local to the HTTP edge
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs` and the tests).
pub fn build_app(services: Arc<AppServices>) -> Router {
    // Everything except /health requires an operator. The actor check runs
    // before any handler sees the services handle.
    let protected = routes::router().layer(
        ServiceBuilder::new()
            .layer(axum::middleware::from_fn(middleware::actor_middleware))
            .layer(Extension(services)),
    );

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
}
