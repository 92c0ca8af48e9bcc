//! Request audit records.
//!
//! Two variants, selected at startup:
//! - [`audit_requests`]: an `http` record when the request arrives and another
//!   when its response completes
//! - [`audit_errors`]: a single `error` record, only for responses >= 400
//!
//! Completion is observed through the request's [`CompletionHooks`]; without a
//! registry the record is written as soon as the response is produced.

use std::time::Instant;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use serde_json::json;

use crate::http::completion::{Completion, CompletionHooks};
use crate::http::request::RequestContext;
use crate::observability::{logging::iso8601, metrics, Logger};

/// Log every request on arrival and on completion.
pub async fn audit_requests(State(logger): State<Logger>, request: Request, next: Next) -> Response {
    let context = context_of(&request);

    logger.http(
        "Incoming request",
        json!({
            "method": context.method,
            "url": context.url,
            "ip": context.ip(),
            "userAgent": context.user_agent(),
            "requestId": context.request_id,
            "timestamp": iso8601(&context.received_at),
        }),
    );

    let started = context.started_at;
    on_completion(request, next, started, move |completion| {
        logger.http(
            "Request completed",
            json!({
                "method": context.method,
                "url": context.url,
                "statusCode": completion.status.as_u16(),
                "duration": format!("{}ms", completion.duration.as_millis()),
                "contentLength": completion.content_length,
                "ip": context.ip(),
                "requestId": context.request_id,
            }),
        );
        metrics::record_request(&context.method, completion.status.as_u16(), completion.duration);
    })
    .await
}

/// Log only requests that end in a client or server error.
pub async fn audit_errors(State(logger): State<Logger>, request: Request, next: Next) -> Response {
    let context = context_of(&request);

    let started = context.started_at;
    on_completion(request, next, started, move |completion| {
        metrics::record_request(&context.method, completion.status.as_u16(), completion.duration);
        if completion.status.as_u16() < 400 {
            return;
        }

        logger.error(
            "Request error",
            json!({
                "method": context.method,
                "url": context.url,
                "statusCode": completion.status.as_u16(),
                "duration": format!("{}ms", completion.duration.as_millis()),
                "ip": context.ip(),
                "userAgent": context.user_agent(),
                "requestId": context.request_id,
                "body": context.body(),
                "params": context.params(),
                "query": context.query,
            }),
        );
    })
    .await
}

fn context_of(request: &Request) -> RequestContext {
    request
        .extensions()
        .get::<RequestContext>()
        .cloned()
        .unwrap_or_else(|| RequestContext::capture(request))
}

async fn on_completion(
    request: Request,
    next: Next,
    started: Instant,
    hook: impl FnOnce(&Completion) + Send + 'static,
) -> Response {
    match request.extensions().get::<CompletionHooks>().cloned() {
        Some(hooks) => {
            hooks.on_complete(hook);
            next.run(request).await
        }
        None => {
            let response = next.run(request).await;
            hook(&Completion::immediate(&response, started));
            response
        }
    }
}
