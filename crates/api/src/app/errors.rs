use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use weighbridge_core::DomainError;
use weighbridge_infra::WorkflowError;
use weighbridge_infra::store::StoreError;
use weighbridge_reference::LookupKind;

pub fn workflow_error_to_response(err: WorkflowError) -> axum::response::Response {
    match err {
        WorkflowError::Domain(e) => domain_error_to_response(e),
        WorkflowError::Store(StoreError::NotFound) => {
            json_error(StatusCode::NOT_FOUND, "not_found", "not found")
        }
        WorkflowError::Store(StoreError::Conflict(msg)) => json_error(StatusCode::CONFLICT, "conflict", msg),
        WorkflowError::Store(e) => {
            tracing::error!(error = %e, "store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "Internal error.")
        }
        WorkflowError::Failed(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "failed", msg),
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(errors) => json_errors(
            StatusCode::BAD_REQUEST,
            "validation_error",
            errors.messages().to_vec(),
        ),
        DomainError::Locked(msg) => json_error(StatusCode::FORBIDDEN, "locked", msg),
        DomainError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::InvariantViolation(msg) => {
            tracing::error!(%msg, "invariant violated");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "invariant_violation", msg)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    let message = message.into();
    json_errors(status, code, vec![message])
}

/// `message` is the first entry of `errors`.
pub fn json_errors(
    status: StatusCode,
    code: &'static str,
    errors: Vec<String>,
) -> axum::response::Response {
    let message = errors.first().cloned().unwrap_or_default();
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message,
            "errors": errors,
        })),
    )
        .into_response()
}

pub fn parse_id<T: core::str::FromStr>(raw: &str, what: &str) -> Result<T, axum::response::Response> {
    raw.parse()
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id")))
}

pub fn parse_lookup_kind(raw: &str) -> Result<LookupKind, axum::response::Response> {
    raw.parse()
        .map_err(|_| json_error(StatusCode::NOT_FOUND, "unknown_lookup", format!("unknown lookup table: {raw}")))
}
