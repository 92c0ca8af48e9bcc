//! Chess application backend: HTTP host, request instrumentation and error
//! surfacing.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ completion tracking ─▶ request id ─▶ request context
//!                                                               │
//!                     ┌─────────────────────────────────────────┘
//!                     ▼
//!              error classifier ─▶ panic capture ─▶ security headers ─▶ CORS
//!                                                                        │
//!                     ┌──────────────────────────────────────────────────┘
//!                     ▼
//!              cookies ─▶ rate limit ─▶ body decoding ─▶ audit ─▶ routes
//!
//!     Cross-cutting: config (resolved once), observability (leveled logger,
//!     layers, metrics), lifecycle (startup banner, graceful shutdown)
//! ```

pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::ServiceConfig;
pub use error::{ApiError, ErrorKind};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use observability::Logger;
