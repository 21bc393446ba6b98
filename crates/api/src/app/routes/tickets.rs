use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use weighbridge_core::TicketId;
use weighbridge_infra::workflow::tickets::{
    CaptureWeight, ProductDefaultsQuery, ReadoutRequest, TicketSubmission,
};
use weighbridge_tickets::{DisplayedWeights, TicketQuery, WeightLeg};

use crate::app::dto::VersionRequest;
use crate::app::errors::{self, workflow_error_to_response};
use crate::app::services::AppServices;
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_tickets))
        .route("/quick", post(quick_create))
        .route("/weights/read", post(read_weight))
        .route("/weights/read-apply", post(read_weight_apply))
        .route("/weights/swap-preview", post(swap_preview))
        .route("/product-defaults", get(product_defaults))
        .route("/:id", get(get_ticket).post(submit_ticket))
        .route("/:id/weights/:leg", post(capture_weight))
        .route("/:id/swap-weights", post(swap_weights))
}

pub async fn list_tickets(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<TicketQuery>,
) -> axum::response::Response {
    match services.list_tickets(&query).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}

pub async fn quick_create(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.quick_create_ticket().await {
        Ok(result) => {
            let status = if result.created { StatusCode::CREATED } else { StatusCode::OK };
            (status, Json(result)).into_response()
        }
        Err(e) => workflow_error_to_response(e),
    }
}

pub async fn get_ticket(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: TicketId = match errors::parse_id(&id, "ticket") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.view_ticket(id).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}

pub async fn submit_ticket(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<TicketSubmission>,
) -> axum::response::Response {
    let id: TicketId = match errors::parse_id(&id, "ticket") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.submit_ticket(id, &body, actor.actor()).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}

pub async fn capture_weight(
    Extension(services): Extension<Arc<AppServices>>,
    Path((id, leg)): Path<(String, String)>,
    Json(body): Json<CaptureWeight>,
) -> axum::response::Response {
    let id: TicketId = match errors::parse_id(&id, "ticket") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let leg: WeightLeg = match leg.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "unknown weight leg"),
    };
    match services.capture_weight(id, leg, &body).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}

/// The body is optional; without one the swap is unconditional.
pub async fn swap_weights(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Option<Json<VersionRequest>>,
) -> axum::response::Response {
    let id: TicketId = match errors::parse_id(&id, "ticket") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let expected = body.and_then(|Json(b)| b.expected_version);
    match services.swap_ticket_weights(id, expected).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}

pub async fn read_weight(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<ReadoutRequest>,
) -> axum::response::Response {
    match services.preview_readout(&body) {
        Ok(panel) => (StatusCode::OK, Json(panel)).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}

pub async fn read_weight_apply(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<ReadoutRequest>,
) -> axum::response::Response {
    match services.preview_readout_apply(&body) {
        Ok(panel) => (StatusCode::OK, Json(panel)).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}

pub async fn swap_preview(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<DisplayedWeights>,
) -> axum::response::Response {
    match services.preview_swap(&body) {
        Ok(panel) => (StatusCode::OK, Json(panel)).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}

/// 204 when no product is selected or it does not exist.
pub async fn product_defaults(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<ProductDefaultsQuery>,
) -> axum::response::Response {
    match services.product_defaults(&query).await {
        Ok(Some(defaults)) => (StatusCode::OK, Json(defaults)).into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}
