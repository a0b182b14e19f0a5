//! Request extractors that report failures in the same `{"error","message"}`
//! shape as domain errors.

use axum::{
    Json, async_trait,
    extract::{FromRequest, Request, rejection::JsonRejection},
    response::Response,
};
use serde::de::DeserializeOwned;

use geoaccess_core::ErrorKind;

use crate::app::errors;

/// `Json<T>` whose rejection is a `validation_error` body instead of plain text.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(rejection_response(rejection)),
        }
    }
}

fn rejection_response(rejection: JsonRejection) -> Response {
    let kind = ErrorKind::Validation;
    errors::json_error(errors::status_for(kind), kind.as_str(), rejection.body_text())
}
