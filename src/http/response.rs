//! Error classification and rendering.
//!
//! # Responsibilities
//! - Map an [`ApiError`] to a status code and a public message
//! - Render the client-safe `{success: false, error, details?, stack?}` body
//! - Log every error with full request context before responding
//!
//! # Design Decisions
//! - Classification is an exhaustive match over the closed error kind
//! - The request context is used for logging only, never for classification
//! - Stack traces leave the process only when explicitly enabled

use std::any::Any;
use std::borrow::Cow;

use axum::{
    extract::{Request, State},
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE},
        StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{ApiError, ErrorKind};
use crate::http::request::RequestContext;
use crate::observability::Logger;

const FALLBACK_MESSAGE: &str = "Internal Server Error";

/// Resolve the status code and the message the client sees.
pub fn classify(error: &ApiError) -> (StatusCode, Cow<'_, str>) {
    match error.kind() {
        ErrorKind::Validation => (StatusCode::BAD_REQUEST, Cow::Borrowed("Validation Error")),
        ErrorKind::Unauthorized => (StatusCode::UNAUTHORIZED, Cow::Borrowed("Unauthorized")),
        ErrorKind::MalformedIdentifier => {
            (StatusCode::BAD_REQUEST, Cow::Borrowed("Invalid ID format"))
        }
        ErrorKind::Conflict => (StatusCode::CONFLICT, Cow::Borrowed("Duplicate Entry")),
        ErrorKind::Unknown { status } => {
            let message = match error.message() {
                "" => FALLBACK_MESSAGE,
                message => message,
            };
            (
                status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                Cow::Borrowed(message),
            )
        }
    }
}

/// Body of every error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorBody {
    pub fn new(error: &ApiError, expose_stack: bool) -> (StatusCode, Self) {
        let (status, message) = classify(error);
        let body = Self {
            success: false,
            error: message.into_owned(),
            details: error.details().cloned(),
            stack: expose_stack.then(|| error.stack()),
        };
        (status, body)
    }
}

/// Render `error` as a JSON response.
pub fn render(error: &ApiError, expose_stack: bool) -> Response {
    let (status, body) = ErrorBody::new(error, expose_stack);
    (status, Json(body)).into_response()
}

/// Dependencies of the error handler.
#[derive(Debug, Clone)]
pub struct ErrorHandlerState {
    pub logger: Logger,
    pub expose_stack_traces: bool,
}

/// Terminal error handler.
///
/// Responses carrying an [`ApiError`] are logged and re-rendered; headers set
/// by inner layers (CORS, security headers) are kept. Everything else passes
/// through untouched.
pub async fn handle_errors(
    State(state): State<ErrorHandlerState>,
    request: Request,
    next: Next,
) -> Response {
    let context = request.extensions().get::<RequestContext>().cloned();
    let response = next.run(request).await;

    let (mut parts, body) = response.into_parts();
    let Some(error) = parts.extensions.remove::<ApiError>() else {
        return Response::from_parts(parts, body);
    };
    drop(body);

    log_error(&state.logger, &error, context.as_ref());

    let mut rendered = render(&error, state.expose_stack_traces);
    for (name, value) in parts.headers.iter() {
        if name != CONTENT_TYPE && name != CONTENT_LENGTH {
            rendered.headers_mut().append(name.clone(), value.clone());
        }
    }
    rendered
}

fn log_error(logger: &Logger, error: &ApiError, context: Option<&RequestContext>) {
    let mut metadata = json!({
        "message": error.message(),
        "kind": error.kind().name(),
        "stack": error.stack(),
    });

    if let (Some(cause), Value::Object(map)) = (error.cause(), &mut metadata) {
        map.insert("cause".into(), json!(cause));
    }

    if let (Some(context), Value::Object(map)) = (context, &mut metadata) {
        map.insert("url".into(), json!(context.url));
        map.insert("method".into(), json!(context.method));
        map.insert("body".into(), context.body());
        map.insert("params".into(), context.params());
        map.insert("query".into(), context.query.clone());
        map.insert("ip".into(), json!(context.ip()));
        map.insert("userAgent".into(), json!(context.user_agent()));
        map.insert("requestId".into(), json!(context.request_id));
    }

    logger.error("API Error", metadata);
}

/// Panic handler for `CatchPanicLayer`: the panic becomes an unclassified
/// error so it is logged and rendered like any other. The payload stays in
/// the cause; clients only see the generic message.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    };

    ApiError::internal(FALLBACK_MESSAGE)
        .with_cause(format!("Handler panicked: {detail}"))
        .into_response()
}
