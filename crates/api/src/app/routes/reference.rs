use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};

use weighbridge_core::LookupId;
use weighbridge_reference::{CreateCustomer, CreateLookup, CreateProduct, CreateVehicle};

use crate::app::errors::{self, workflow_error_to_response};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/customers", post(create_customer))
        .route("/vehicles", post(create_vehicle))
        .route("/products", post(create_product))
        .route("/lookups/:kind", post(create_lookup).get(list_lookups))
        .route("/lookups/:kind/:id/deactivate", post(deactivate_lookup))
        .route("/lookups/:kind/:id/activate", post(activate_lookup))
}

pub async fn create_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<CreateCustomer>,
) -> axum::response::Response {
    match services.create_customer(&body).await {
        Ok(customer) => (StatusCode::CREATED, Json(customer)).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}

pub async fn create_vehicle(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<CreateVehicle>,
) -> axum::response::Response {
    match services.create_vehicle(&body).await {
        Ok(vehicle) => (StatusCode::CREATED, Json(vehicle)).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<CreateProduct>,
) -> axum::response::Response {
    match services.create_product(&body).await {
        Ok(product) => (StatusCode::CREATED, Json(product)).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}

pub async fn create_lookup(
    Extension(services): Extension<Arc<AppServices>>,
    Path(kind): Path<String>,
    Json(body): Json<CreateLookup>,
) -> axum::response::Response {
    let kind = match errors::parse_lookup_kind(&kind) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.create_lookup(kind, &body).await {
        Ok(lookup) => (StatusCode::CREATED, Json(lookup)).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}

pub async fn list_lookups(
    Extension(services): Extension<Arc<AppServices>>,
    Path(kind): Path<String>,
) -> axum::response::Response {
    let kind = match errors::parse_lookup_kind(&kind) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.list_lookups(kind).await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}

/// Always 200 when the row exists; a guarded refusal is `success: false`.
pub async fn deactivate_lookup(
    Extension(services): Extension<Arc<AppServices>>,
    Path((kind, id)): Path<(String, String)>,
) -> axum::response::Response {
    let kind = match errors::parse_lookup_kind(&kind) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let id: LookupId = match errors::parse_id(&id, "lookup") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.deactivate_lookup(kind, id).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}

pub async fn activate_lookup(
    Extension(services): Extension<Arc<AppServices>>,
    Path((kind, id)): Path<(String, String)>,
) -> axum::response::Response {
    let kind = match errors::parse_lookup_kind(&kind) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let id: LookupId = match errors::parse_id(&id, "lookup") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.activate_lookup(kind, id).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}
