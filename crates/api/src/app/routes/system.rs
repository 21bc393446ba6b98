use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use crate::app::services::AppServices;
use crate::context::ActorContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Operator and backend the request was served with.
pub async fn whoami(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "actor": actor.actor().as_str(),
        "backend": services.backend().as_str(),
    }))
}
