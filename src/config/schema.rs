//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits so a TOML file can provide a base layer that
//! environment variables then override (see `loader.rs`).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::observability::logging::Level;

/// Value of `NODE_ENV` that switches the service into production behaviour.
pub const PRODUCTION: &str = "production";

/// Root configuration for the service.
///
/// Resolved once at startup and shared read-only (behind an `Arc`) with every
/// component that needs it.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Deployment environment name (`NODE_ENV`).
    pub environment: String,

    /// Listener settings.
    pub server: ServerConfig,

    /// Cross-origin policy.
    pub cors: CorsConfig,

    /// Logger settings.
    pub logging: LoggingConfig,

    /// Per-client request ceiling.
    pub rate_limit: RateLimitConfig,

    /// Request body decoding.
    pub body: BodyConfig,

    /// Client-facing error rendering.
    pub errors: ErrorConfig,

    /// Public hostname used in the startup banner (`RENDER_EXTERNAL_HOSTNAME`).
    pub public_hostname: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            server: ServerConfig::default(),
            cors: CorsConfig::default(),
            logging: LoggingConfig::default(),
            rate_limit: RateLimitConfig::default(),
            body: BodyConfig::default(),
            errors: ErrorConfig::default(),
            public_hostname: None,
        }
    }
}

impl ServiceConfig {
    pub fn is_production(&self) -> bool {
        self.environment == PRODUCTION
    }

    /// Address the listener binds to. Production listens on every interface,
    /// anything else stays on loopback unless a host is configured.
    pub fn bind_host(&self) -> &str {
        match &self.server.host {
            Some(host) => host,
            None if self.is_production() => "0.0.0.0",
            None => "127.0.0.1",
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_host(), self.server.port)
    }

    /// Requests allowed per client within one rate limit window.
    pub fn max_requests(&self) -> u32 {
        self.rate_limit
            .max_requests
            .unwrap_or(if self.is_production() { 200 } else { 100 })
    }

    /// Whether error responses carry the internal stack trace.
    pub fn expose_stack_traces(&self) -> bool {
        self.errors
            .expose_stack_traces
            .unwrap_or(!self.is_production())
    }

    /// Base URL announced in the startup banner.
    pub fn public_base_url(&self) -> String {
        match (&self.public_hostname, self.is_production()) {
            (Some(host), true) => format!("https://{host}"),
            _ => format!("http://localhost:{}", self.server.port),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen port.
    pub port: u16,

    /// Explicit bind host; derived from the environment when absent.
    pub host: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 4000,
            host: None,
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// The single origin allowed to make credentialed cross-origin calls.
    pub frontend_url: String,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
        }
    }
}

/// Which audit records the request logger emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuditMode {
    /// A start record and a completion record for every request.
    #[default]
    All,
    /// A single error record, only for responses with status >= 400.
    Errors,
}

/// Logger configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum severity that reaches any log layer.
    pub level: Level,

    /// Service tag stamped on every record.
    pub service_name: String,

    /// Directory for the log files (non-production only).
    pub directory: PathBuf,

    /// Request audit variant.
    pub request_log: AuditMode,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::Info,
            service_name: "chess-app-backend".to_string(),
            directory: PathBuf::from("logs"),
            request_log: AuditMode::All,
        }
    }
}

/// Fixed window rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Window length in seconds.
    pub window_secs: u64,

    /// Ceiling per window; derived from the environment when absent.
    pub max_requests: Option<u32>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 15 * 60,
            max_requests: None,
        }
    }
}

/// Body decoding configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BodyConfig {
    /// Largest request body accepted, in bytes.
    pub limit_bytes: usize,
}

impl Default for BodyConfig {
    fn default() -> Self {
        Self {
            limit_bytes: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Error rendering configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ErrorConfig {
    /// Include stack traces in error bodies; defaults to on outside production.
    pub expose_stack_traces: Option<bool>,
}
