//! Fixed window rate limiting per client IP.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::{header::RETRY_AFTER, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use serde_json::json;

use crate::config::ServiceConfig;
use crate::http::request::client_ip;
use crate::observability::{metrics, Logger};

pub const LIMITED_MESSAGE: &str = "Too many requests from this IP, please try again later.";

/// Windows kept before expired ones are swept.
const PRUNE_THRESHOLD: usize = 10_000;

struct Window {
    started: Instant,
    count: u32,
}

/// Outcome of one rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32, reset: Duration },
    Limited { reset: Duration },
}

/// Counts requests per client within fixed windows.
pub struct RateLimiter {
    windows: DashMap<Option<IpAddr>, Window>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests,
            window,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(
            config.max_requests(),
            Duration::from_secs(config.rate_limit.window_secs),
        )
    }

    /// Count one request from `client`. Clients without a known address
    /// share a single window.
    pub fn check(&self, client: Option<IpAddr>) -> Decision {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: Option<IpAddr>, now: Instant) -> Decision {
        if self.windows.len() > PRUNE_THRESHOLD {
            self.prune(now);
        }

        let mut entry = self.windows.entry(client).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
        }

        let reset = self.window.saturating_sub(now.duration_since(entry.started));
        if entry.count >= self.max_requests {
            return Decision::Limited { reset };
        }
        entry.count += 1;
        Decision::Allowed {
            remaining: self.max_requests - entry.count,
            reset,
        }
    }

    /// Drop windows that have expired.
    fn prune(&self, now: Instant) {
        self.windows
            .retain(|_, w| now.duration_since(w.started) < self.window);
    }

    fn policy(&self) -> String {
        format!("{};w={}", self.max_requests, self.window.as_secs())
    }
}

/// Limiter plus the logger that reports rejections.
#[derive(Clone)]
pub struct RateLimitState {
    limiter: Arc<RateLimiter>,
    logger: Logger,
}

impl RateLimitState {
    pub fn new(limiter: RateLimiter, logger: Logger) -> Self {
        Self {
            limiter: Arc::new(limiter),
            logger,
        }
    }
}

/// Reject clients over their window's ceiling with 429.
pub async fn rate_limit(State(state): State<RateLimitState>, request: Request, next: Next) -> Response {
    let client = client_ip(&request);
    let limiter = &state.limiter;

    match limiter.check(client) {
        Decision::Allowed { remaining, reset } => {
            let mut response = next.run(request).await;
            set_headers(response.headers_mut(), limiter, remaining, reset);
            response
        }
        Decision::Limited { reset } => {
            state.logger.warn(
                "Rate limit exceeded",
                json!({
                    "ip": client.map(|ip| ip.to_string()),
                    "method": request.method().as_str(),
                    "url": request.uri().to_string(),
                }),
            );
            metrics::record_rate_limited();

            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({ "success": false, "error": LIMITED_MESSAGE })),
            )
                .into_response();
            let headers = response.headers_mut();
            set_headers(headers, limiter, 0, reset);
            headers.insert(RETRY_AFTER, HeaderValue::from(ceil_secs(reset)));
            response
        }
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

fn set_headers(headers: &mut HeaderMap, limiter: &RateLimiter, remaining: u32, reset: Duration) {
    if let Ok(policy) = HeaderValue::from_str(&limiter.policy()) {
        headers.insert(HeaderName::from_static("ratelimit-policy"), policy);
    }
    headers.insert(
        HeaderName::from_static("ratelimit-limit"),
        HeaderValue::from(limiter.max_requests),
    );
    headers.insert(
        HeaderName::from_static("ratelimit-remaining"),
        HeaderValue::from(remaining),
    );
    headers.insert(
        HeaderName::from_static("ratelimit-reset"),
        HeaderValue::from(ceil_secs(reset)),
    );
}
