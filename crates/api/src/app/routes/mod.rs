use axum::{Router, routing::get};

pub mod invoices;
pub mod reference;
pub mod system;
pub mod tickets;

/// Router for all endpoints that need an operator.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/tickets", tickets::router())
        .nest("/invoices", invoices::router())
        .merge(reference::router())
}
