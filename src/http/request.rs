//! Request context capture.
//!
//! # Responsibilities
//! - Snapshot method, URL, client address, user agent and query on arrival
//! - Offer write-once slots for the decoded body and route params
//! - Expose the context to later middleware through request extensions
//!
//! # Design Decisions
//! - Captured once, as early as possible, so every later step sees the same
//!   start instant
//! - Core components only read the context; the body decoder and the route
//!   params recorder each fill their slot exactly once

use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use axum::{
    extract::{rejection::RawPathParamsRejection, ConnectInfo, RawPathParams, Request},
    http::header::USER_AGENT,
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Everything the core knows about an in-flight request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: String,
    /// Path and query as received.
    pub url: String,
    pub client_ip: Option<IpAddr>,
    pub user_agent: Option<String>,
    /// `x-request-id` assigned by the request id layer.
    pub request_id: Option<String>,
    pub query: Value,
    pub started_at: Instant,
    pub received_at: DateTime<Utc>,
    body: Arc<OnceLock<Value>>,
    params: Arc<OnceLock<Value>>,
}

impl RequestContext {
    pub fn capture(request: &Request) -> Self {
        let uri = request.uri();
        let url = uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| uri.path().to_string());

        Self {
            method: request.method().to_string(),
            url,
            client_ip: client_ip(request),
            user_agent: request
                .headers()
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            request_id: request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            query: parse_query(uri.query()),
            started_at: Instant::now(),
            received_at: Utc::now(),
            body: Arc::new(OnceLock::new()),
            params: Arc::new(OnceLock::new()),
        }
    }

    /// Decoded request body, `{}` until the decoder has run.
    pub fn body(&self) -> Value {
        self.body.get().cloned().unwrap_or_else(empty_object)
    }

    /// Route params, `{}` until a route has matched.
    pub fn params(&self) -> Value {
        self.params.get().cloned().unwrap_or_else(empty_object)
    }

    /// Fill the body slot. Later calls are ignored.
    pub fn set_body(&self, body: Value) {
        let _ = self.body.set(body);
    }

    /// Fill the params slot. Later calls are ignored.
    pub fn set_params(&self, params: Value) {
        let _ = self.params.set(params);
    }

    /// Client address as rendered in log records.
    pub fn ip(&self) -> String {
        self.client_ip
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Peer address of the connection the request arrived on.
pub fn client_ip(request: &Request) -> Option<IpAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// Decode a query string into a JSON object. Repeated keys collect into an array.
pub fn parse_query(query: Option<&str>) -> Value {
    let mut object = Map::new();
    if let Some(query) = query {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            insert_pair(&mut object, key.into_owned(), value.into_owned());
        }
    }
    Value::Object(object)
}

pub(crate) fn insert_pair(object: &mut Map<String, Value>, key: String, value: String) {
    match object.get_mut(&key) {
        Some(Value::Array(values)) => values.push(Value::String(value)),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, Value::String(value)]);
        }
        None => {
            object.insert(key, Value::String(value));
        }
    }
}

/// Attach a fresh [`RequestContext`] to the request.
pub async fn capture_context(mut request: Request, next: Next) -> Response {
    let context = RequestContext::capture(&request);
    request.extensions_mut().insert(context);
    next.run(request).await
}

/// Route layer: copy matched path params into the context.
pub async fn record_params(
    params: Result<RawPathParams, RawPathParamsRejection>,
    request: Request,
    next: Next,
) -> Response {
    if let (Ok(params), Some(context)) = (params, request.extensions().get::<RequestContext>()) {
        let object = params
            .iter()
            .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
            .collect::<Map<_, _>>();
        context.set_params(Value::Object(object));
    }
    next.run(request).await
}
