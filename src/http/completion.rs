//! Response completion hooks.
//!
//! The server offers no "response finished" notification to middleware, so
//! completion is observed on the response body: `track_completion` gives every
//! request a [`CompletionHooks`] registry, and wraps the outgoing body in a
//! [`CompletionBody`] that fires the registry once the body reaches end of
//! stream.
//!
//! # Guarantees
//! - Hooks fire at most once per response, however often completion is signalled
//! - Frames pass through untouched
//! - A body dropped before end of stream (client went away) fires nothing,
//!   except a body the server never reads: HEAD responses and 204/304
//!   statuses complete when the server drops their untouched body
//! - Registries are per request; nothing is shared across requests

use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::{
    body::{Body, Bytes},
    extract::Request,
    http::{header::CONTENT_LENGTH, HeaderMap, Method, StatusCode},
    middleware::Next,
    response::Response,
};
use http_body::{Body as HttpBody, Frame, SizeHint};

/// Synthetic "request completed" event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub status: StatusCode,
    /// `Content-Length` header, else the body's exact size, else 0.
    pub content_length: u64,
    pub duration: Duration,
}

impl Completion {
    /// Completion as of right now, for a response whose body is not tracked.
    pub fn immediate(response: &Response, started: Instant) -> Self {
        Self {
            status: response.status(),
            content_length: content_length(response.headers(), &HttpBody::size_hint(response.body())),
            duration: started.elapsed(),
        }
    }
}

fn content_length(headers: &HeaderMap, hint: &SizeHint) -> u64 {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .or_else(|| hint.exact())
        .unwrap_or(0)
}

type Hook = Box<dyn FnOnce(&Completion) + Send>;

#[derive(Default)]
struct HookState {
    hooks: Vec<Hook>,
    fired: bool,
}

/// Per-request registry of completion callbacks.
#[derive(Clone, Default)]
pub struct CompletionHooks {
    state: Arc<Mutex<HookState>>,
}

impl std::fmt::Debug for CompletionHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("CompletionHooks")
            .field("pending", &state.hooks.len())
            .field("fired", &state.fired)
            .finish()
    }
}

impl CompletionHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for when the response completes.
    pub fn on_complete(&self, hook: impl FnOnce(&Completion) + Send + 'static) {
        self.lock().hooks.push(Box::new(hook));
    }

    /// Run every registered callback. Only the first call does anything;
    /// returns whether this call was it.
    pub fn fire(&self, completion: &Completion) -> bool {
        let hooks = {
            let mut state = self.lock();
            if state.fired {
                return false;
            }
            state.fired = true;
            std::mem::take(&mut state.hooks)
        };

        for hook in hooks {
            hook(completion);
        }
        true
    }

    pub fn is_fired(&self) -> bool {
        self.lock().fired
    }

    /// Wrap the response to a `method` request so its body fires these
    /// hooks on completion.
    pub fn attach(&self, response: Response, method: &Method, started: Instant) -> Response {
        let (parts, body) = response.into_parts();
        let pending = PendingCompletion {
            hooks: self.clone(),
            status: parts.status,
            content_length: content_length(&parts.headers, &HttpBody::size_hint(&body)),
            started,
        };

        let body = CompletionBody {
            inner: body,
            pending: Some(pending),
            unread: never_read(method, parts.status),
            polled: false,
        };
        Response::from_parts(parts, Body::new(body))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HookState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct PendingCompletion {
    hooks: CompletionHooks,
    status: StatusCode,
    content_length: u64,
    started: Instant,
}

impl PendingCompletion {
    fn fire(self) {
        self.hooks.fire(&Completion {
            status: self.status,
            content_length: self.content_length,
            duration: self.started.elapsed(),
        });
    }
}

/// Whether the server discards the body without reading it.
fn never_read(method: &Method, status: StatusCode) -> bool {
    *method == Method::HEAD
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

/// Response body that reports its own end of stream.
pub struct CompletionBody {
    inner: Body,
    pending: Option<PendingCompletion>,
    unread: bool,
    polled: bool,
}

impl CompletionBody {
    fn finish(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.fire();
        }
    }
}

impl HttpBody for CompletionBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        this.polled = true;
        let polled = Pin::new(&mut this.inner).poll_frame(cx);

        match &polled {
            Poll::Ready(None) => this.finish(),
            Poll::Ready(Some(Ok(_))) if this.inner.is_end_stream() => this.finish(),
            _ => {}
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for CompletionBody {
    fn drop(&mut self) {
        // The server skips polling bodies that are empty up front or that the
        // response may not carry; those are complete without a frame read.
        if self.inner.is_end_stream() || (self.unread && !self.polled) {
            self.finish();
        }
    }
}

/// Give the request a completion registry and track the response body.
///
/// Stacking this middleware is harmless: an inner instance finds the outer
/// registry and leaves the body alone.
pub async fn track_completion(mut request: Request, next: Next) -> Response {
    if request.extensions().get::<CompletionHooks>().is_some() {
        return next.run(request).await;
    }

    let started = Instant::now();
    let method = request.method().clone();
    let hooks = CompletionHooks::new();
    request.extensions_mut().insert(hooks.clone());

    let response = next.run(request).await;
    hooks.attach(response, &method, started)
}
