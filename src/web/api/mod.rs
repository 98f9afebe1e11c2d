//! API endpoints module.

pub mod agency;

use std::sync::Arc;

use axum::{
    extract::OriginalUri,
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};

use crate::core::{Agency, Intake};
use crate::error::Error;

pub use agency::{
    delete_agent, get_agency, get_agent_status, post_agent, post_messages, post_undeliverable,
    put_agent_custom,
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub agency: Arc<Agency>,
    pub intake: Intake,
}

/// Error returned from a handler. Rendered as a plain-text body.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

/// HTTP status for a domain error.
pub fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::InvalidInput(_) | Error::Json(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Conflict(_) => StatusCode::CONFLICT,
        Error::Congested(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::Undeliverable(_) => StatusCode::BAD_GATEWAY,
        Error::Internal(_) | Error::Config(_) | Error::Io(_) | Error::Http(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (status_for(&self.0), self.0.to_string()).into_response()
    }
}

/// Log a failed request and turn the error into a response.
pub(crate) fn fail(uri: &Uri, error: Error) -> ApiError {
    let status = status_for(&error);
    if status.is_server_error() {
        tracing::error!(path = %uri.path(), status = status.as_u16(), "{}", error);
    } else {
        tracing::warn!(path = %uri.path(), status = status.as_u16(), "{}", error);
    }
    ApiError(error)
}

/// Fallback for a known path called with the wrong method.
pub async fn method_not_allowed(
    method: Method,
    OriginalUri(uri): OriginalUri,
) -> (StatusCode, String) {
    tracing::warn!(path = %uri.path(), "Method {} not allowed", method);
    (
        StatusCode::METHOD_NOT_ALLOWED,
        format!("Method {} not allowed", method),
    )
}

/// Fallback for unknown paths.
pub async fn resource_not_found(uri: Uri) -> (StatusCode, &'static str) {
    tracing::warn!(path = %uri.path(), "Resource not found");
    (StatusCode::NOT_FOUND, "Resource not found")
}
