//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → headers.rs (helmet-style response headers)
//!     → cors.rs (single allowed origin, credentials)
//!     → rate_limit.rs (fixed window per client IP)
//!     → request middleware
//! ```

pub mod cors;
pub mod headers;
pub mod rate_limit;

pub use cors::cors_layer;
pub use headers::{build_security_headers, security_headers};
pub use rate_limit::{rate_limit, RateLimitState, RateLimiter};
