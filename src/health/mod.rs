//! Health endpoint.
//!
//! Reports liveness while the server is serving. Once shutdown has begun the
//! check fails with 503 so load balancers stop routing to this instance.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::http::server::AppState;
use crate::lifecycle::ServerState;
use crate::observability::logging::iso8601;

/// Body of a passing health check.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: String,
    /// Seconds since the service started.
    pub uptime: f64,
    pub environment: String,
}

#[derive(Debug, Clone, Copy, thiserror::Error)]
pub enum HealthError {
    #[error("server is {0}")]
    NotServing(ServerState),
}

impl HealthReport {
    pub fn collect(state: &AppState) -> Result<Self, HealthError> {
        let server_state = state.shutdown.state();
        if !server_state.is_serving() {
            return Err(HealthError::NotServing(server_state));
        }

        Ok(Self {
            status: "ok",
            timestamp: iso8601(&Utc::now()),
            uptime: state.started_at.elapsed().as_secs_f64(),
            environment: state.config.environment.clone(),
        })
    }
}

/// `GET /api/health`
pub async fn health(State(state): State<AppState>) -> Response {
    match HealthReport::collect(&state) {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(err) => {
            state
                .logger
                .error("Health check failed", json!({ "error": err.to_string() }));
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "error",
                    "timestamp": iso8601(&Utc::now()),
                    "error": "Service unavailable",
                })),
            )
                .into_response()
        }
    }
}
