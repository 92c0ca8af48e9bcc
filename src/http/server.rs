//! HTTP server setup.
//!
//! # Responsibilities
//! - Compose the middleware pipeline around the routes
//! - Synthesise 404s for unmatched paths and methods
//! - Serve until the shutdown coordinator starts draining
//!
//! # Middleware Order (outermost first)
//! ```text
//! completion tracking → request id → request context → error classifier
//!     → panic capture → security headers → CORS → cookies → rate limit
//!     → body decoding → audit → routes
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{http::Uri, middleware, routing::get, Router};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
};

use crate::config::{AuditMode, ServiceConfig};
use crate::error::ApiError;
use crate::health::health;
use crate::http::completion::track_completion;
use crate::http::middleware::{audit_errors, audit_requests, decode_body, parse_cookies, BodyLimit};
use crate::http::request::{capture_context, record_params};
use crate::http::response::{handle_errors, panic_response, ErrorHandlerState};
use crate::lifecycle::{ServerState, Shutdown, StartupError};
use crate::observability::Logger;
use crate::security::{
    build_security_headers, cors_layer, rate_limit, security_headers, RateLimitState, RateLimiter,
};

/// Application state injected into handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub logger: Logger,
    pub shutdown: Shutdown,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Arc<ServiceConfig>, logger: Logger, shutdown: Shutdown) -> Self {
        Self {
            config,
            logger,
            shutdown,
            started_at: Instant::now(),
        }
    }
}

/// HTTP server for the backend.
pub struct HttpServer {
    router: Router,
    logger: Logger,
    shutdown: Shutdown,
}

impl HttpServer {
    pub fn new(
        config: Arc<ServiceConfig>,
        logger: Logger,
        shutdown: Shutdown,
    ) -> Result<Self, StartupError> {
        let state = AppState::new(config.clone(), logger.clone(), shutdown.clone());
        let router = Self::build_router(&config, state)?;

        Ok(Self {
            router,
            logger,
            shutdown,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ServiceConfig, state: AppState) -> Result<Router, StartupError> {
        let cors = cors_layer(&config.cors).map_err(|_| StartupError::CorsOrigin {
            origin: config.cors.frontend_url.clone(),
        })?;
        let errors = ErrorHandlerState {
            logger: state.logger.clone(),
            expose_stack_traces: config.expose_stack_traces(),
        };
        let limiter = RateLimitState::new(RateLimiter::from_config(config), state.logger.clone());
        let audit = config.logging.request_log;
        let logger = state.logger.clone();

        let pipeline = ServiceBuilder::new()
            .layer(middleware::from_fn(track_completion))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(middleware::from_fn(capture_context))
            .layer(middleware::from_fn_with_state(errors, handle_errors))
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(middleware::from_fn_with_state(
                build_security_headers(config.is_production()),
                security_headers,
            ))
            .layer(cors)
            .layer(middleware::from_fn(parse_cookies))
            .layer(middleware::from_fn_with_state(limiter, rate_limit))
            .layer(middleware::from_fn_with_state(
                BodyLimit(config.body.limit_bytes),
                decode_body,
            ))
            .option_layer(
                (audit == AuditMode::All)
                    .then(|| middleware::from_fn_with_state(logger.clone(), audit_requests)),
            )
            .option_layer(
                (audit == AuditMode::Errors)
                    .then(|| middleware::from_fn_with_state(logger.clone(), audit_errors)),
            );

        Ok(Router::new()
            .route("/api/health", get(health).fallback(not_found))
            .route_layer(middleware::from_fn(record_params))
            .fallback(not_found)
            .with_state(state)
            .layer(pipeline))
    }

    /// The composed router, for driving the pipeline without a listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until draining begins, then let in-flight
    /// responses finish.
    ///
    /// The state may already be `Listening` (set by startup) or `Draining`
    /// (shutdown requested before traffic started, which drains at once).
    pub async fn run(self, listener: TcpListener) -> Result<(), StartupError> {
        let addr = listener.local_addr().map_err(StartupError::Serve)?;
        if let Err(err) = self.shutdown.advance(ServerState::Listening) {
            if err.from == ServerState::Stopped {
                return Err(err.into());
            }
        }
        tracing::info!(address = %addr, "HTTP server listening");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(self.shutdown.draining())
            .await
            .map_err(StartupError::Serve)?;

        self.logger.info("HTTP server closed", None);
        self.shutdown.advance(ServerState::Stopped)?;
        Ok(())
    }
}

/// Fallback for unmatched paths and methods.
async fn not_found(uri: Uri) -> ApiError {
    let url = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    ApiError::not_found(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MemoryLayer;
    use axum::{body::Body, http::StatusCode};
    use tower::ServiceExt;

    fn server(config: ServiceConfig) -> HttpServer {
        let logger = Logger::builder("svc").layer(MemoryLayer::new()).build();
        HttpServer::new(Arc::new(config), logger, Shutdown::new()).unwrap()
    }

    #[test]
    fn invalid_cors_origin_fails_startup() {
        let mut config = ServiceConfig::default();
        config.cors.frontend_url = "http://bad\norigin".to_string();
        let logger = Logger::builder("svc").build();

        let err = HttpServer::new(Arc::new(config), logger, Shutdown::new()).err();
        assert!(matches!(err, Some(StartupError::CorsOrigin { .. })));
    }

    #[tokio::test]
    async fn trigger_before_listening_still_stops_cleanly() {
        let shutdown = Shutdown::new();
        let logger = Logger::builder("svc").build();
        let server = HttpServer::new(Arc::new(ServiceConfig::default()), logger, shutdown.clone()).unwrap();
        assert!(shutdown.trigger());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), server.run(listener))
            .await
            .unwrap();

        assert!(result.is_ok());
        assert_eq!(shutdown.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn run_accepts_state_already_listening() {
        let shutdown = Shutdown::new();
        let server = HttpServer::new(
            Arc::new(ServiceConfig::default()),
            Logger::builder("svc").build(),
            shutdown.clone(),
        )
        .unwrap();
        shutdown.advance(ServerState::Listening).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let handle = tokio::spawn(server.run(listener));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        shutdown.trigger();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(shutdown.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn wrong_method_on_known_route_is_404() {
        let response = server(ServiceConfig::default())
            .router()
            .oneshot(
                axum::http::Request::builder()
                    .method("DELETE")
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key("x-request-id"));
    }
}
