//! Error descriptors raised by handlers and middleware.
//!
//! An [`ApiError`] travels out of the failing step inside the response it
//! produces and is consumed by the error classifier in `http::response`.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::Value;

/// What went wrong, carrying only the fields each kind needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Input failed validation.
    Validation,
    /// Missing or invalid credentials.
    Unauthorized,
    /// An identifier could not be parsed.
    MalformedIdentifier,
    /// A unique key already exists in the data layer.
    Conflict,
    /// Anything else, optionally with the status the raiser asked for.
    Unknown { status: Option<StatusCode> },
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::Unauthorized => "UnauthorizedError",
            ErrorKind::MalformedIdentifier => "MalformedIdentifierError",
            ErrorKind::Conflict => "ConflictError",
            ErrorKind::Unknown { .. } => "Error",
        }
    }
}

/// An error on its way to the client.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
    details: Option<Value>,
    cause: Option<String>,
    trace: Arc<Backtrace>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
            cause: None,
            trace: Arc::new(Backtrace::capture()),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn malformed_identifier(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedIdentifier, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// Unclassified error with a declared status.
    pub fn with_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown { status: Some(status) }, message)
    }

    /// Unclassified error; rendered as 500.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown { status: None }, message)
    }

    /// Synthesised for requests no route matched.
    pub fn not_found(url: &str) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, format!("Route {url} not found"))
    }

    /// Attach a client-visible detail payload.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Attach an internal cause, logged and kept in the stack but never
    /// rendered in the public message or details.
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    pub fn cause(&self) -> Option<&str> {
        self.cause.as_deref()
    }

    /// Internal-only trace: `Kind: message`, followed by the captured
    /// backtrace when `RUST_BACKTRACE` enabled capturing.
    pub fn stack(&self) -> String {
        let mut stack = format!("{}: {}", self.kind.name(), self.message);
        if let Some(cause) = &self.cause {
            stack.push_str("\nCaused by: ");
            stack.push_str(cause);
        }
        if self.trace.status() == BacktraceStatus::Captured {
            stack.push('\n');
            stack.push_str(&self.trace.to_string());
        }
        stack
    }
}

impl IntoResponse for ApiError {
    /// Renders the production-safe body and hands the descriptor itself to
    /// the classifier through the response extensions.
    fn into_response(self) -> Response {
        let mut response = crate::http::response::render(&self, false);
        response.extensions_mut().insert(self);
        response
    }
}

impl From<uuid::Error> for ApiError {
    fn from(e: uuid::Error) -> Self {
        ApiError::malformed_identifier(e.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::validation(e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let reason = rejection.body_text();
        ApiError::validation(reason.clone()).with_details(serde_json::json!({ "reason": reason }))
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_carries_404_and_route() {
        let err = ApiError::not_found("/foo");
        assert_eq!(
            err.kind(),
            ErrorKind::Unknown {
                status: Some(StatusCode::NOT_FOUND)
            }
        );
        assert_eq!(err.message(), "Route /foo not found");
    }

    #[test]
    fn stack_starts_with_kind_and_message() {
        let err = ApiError::conflict("username taken");
        assert!(err.stack().starts_with("ConflictError: username taken"));
    }

    #[test]
    fn cause_is_kept_in_stack_only() {
        let err = ApiError::internal("Internal Server Error").with_cause("pool exhausted");
        assert_eq!(err.message(), "Internal Server Error");
        assert!(err
            .stack()
            .starts_with("Error: Internal Server Error\nCaused by: pool exhausted"));
    }

    #[test]
    fn malformed_uuid_maps_to_identifier_error() {
        let err: ApiError = "not-a-uuid".parse::<uuid::Uuid>().unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::MalformedIdentifier);
    }

    #[test]
    fn bad_json_maps_to_validation_error() {
        let err: ApiError = serde_json::from_str::<Value>("{oops").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn into_response_keeps_descriptor() {
        let response = ApiError::unauthorized("token expired").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let carried = response.extensions().get::<ApiError>().unwrap();
        assert_eq!(carried.message(), "token expired");
    }
}
