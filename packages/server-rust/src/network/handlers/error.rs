//! Error-to-response mapping for every role.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use linkgate_core::{ErrorBody, ShortenerError};

pub use crate::dispatch::error::UNAVAILABLE_MESSAGE;
use crate::dispatch::DispatchError;

/// Message returned for unclassified gateway failures.
pub const INTERNAL_MESSAGE: &str = "something went wrong";

/// A JSON `{ "error": ... }` response with a status.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody::new(message),
        }
    }

    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Backend roles report their own errors verbatim.
impl From<ShortenerError> for ApiError {
    fn from(err: ShortenerError) -> Self {
        let status = match err {
            ShortenerError::MalformedInput { .. } => StatusCode::BAD_REQUEST,
            ShortenerError::NotFound => StatusCode::NOT_FOUND,
            ShortenerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "storage failure");
        }
        Self::new(status, err.to_string())
    }
}

/// The gateway hides internals: a total outage is 504, anything
/// unclassified is a generic 500.
impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::MalformedInput(message) => Self::new(StatusCode::BAD_REQUEST, message),
            DispatchError::NotFound(message) => Self::new(StatusCode::NOT_FOUND, message),
            e if e.indicates_no_endpoints() => {
                Self::new(StatusCode::GATEWAY_TIMEOUT, UNAVAILABLE_MESSAGE)
            }
            e => {
                tracing::error!(error = %e, "unclassified dispatch failure");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE)
            }
        }
    }
}
