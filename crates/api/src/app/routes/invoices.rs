use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use weighbridge_core::InvoiceId;
use weighbridge_infra::workflow::invoices::{InvoiceVoidRequest, PaymentRequest};
use weighbridge_invoicing::{GenerateInvoice, InvoiceQuery};

use crate::app::errors::{self, workflow_error_to_response};
use crate::app::services::AppServices;
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_invoices))
        .route("/preview", post(preview_invoice))
        .route("/generate", post(generate_invoice))
        .route("/:id", get(get_invoice))
        .route("/:id/paid", post(mark_paid))
        .route("/:id/void", post(void_invoice))
}

pub async fn list_invoices(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<InvoiceQuery>,
) -> axum::response::Response {
    match services.list_invoices(&query).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}

pub async fn preview_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<GenerateInvoice>,
) -> axum::response::Response {
    match services.preview_invoice(&body).await {
        Ok(preview) => (StatusCode::OK, Json(preview)).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}

pub async fn generate_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<GenerateInvoice>,
) -> axum::response::Response {
    match services.generate_invoice(&body).await {
        Ok(detail) => (StatusCode::CREATED, Json(detail)).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}

pub async fn get_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: InvoiceId = match errors::parse_id(&id, "invoice") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.invoice_detail(id).await {
        Ok(detail) => (StatusCode::OK, Json(detail)).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}

pub async fn mark_paid(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<PaymentRequest>,
) -> axum::response::Response {
    let id: InvoiceId = match errors::parse_id(&id, "invoice") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.mark_invoice_paid(id, &body, actor.actor()).await {
        Ok(invoice) => (StatusCode::OK, Json(invoice)).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}

pub async fn void_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<InvoiceVoidRequest>,
) -> axum::response::Response {
    let id: InvoiceId = match errors::parse_id(&id, "invoice") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.void_invoice(id, &body, actor.actor()).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}
