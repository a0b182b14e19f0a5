use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;
use serde_json::json;

use geoaccess_core::{DomainError, DomainResult, ErrorKind};

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation | ErrorKind::WeakPassword | ErrorKind::InvalidRole | ErrorKind::InvalidParent => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::DuplicateName
        | ErrorKind::DuplicateEmail
        | ErrorKind::AlreadyAssigned
        | ErrorKind::HasDependents => StatusCode::CONFLICT,
        ErrorKind::StorageFailure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    let kind = err.kind();
    let status = status_for(kind);
    if status.is_server_error() {
        tracing::error!(error = %err, "request failed");
    }
    json_error(status, kind.as_str(), err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// `{"data": value}` with the given status.
pub fn data<T: Serialize>(status: StatusCode, value: T) -> axum::response::Response {
    (status, axum::Json(json!({ "data": value }))).into_response()
}

/// Success as `{"data": ..}`, failure as the mapped error body.
pub fn respond<T: Serialize>(status: StatusCode, result: DomainResult<T>) -> axum::response::Response {
    match result {
        Ok(value) => data(status, value),
        Err(e) => domain_error_to_response(e),
    }
}
