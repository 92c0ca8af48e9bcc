//! Request middleware.
//!
//! # Data Flow
//! ```text
//! cookies.rs (Cookie header → Cookies extension)
//!     → [rate limiting, see security/]
//!     → body.rs (bounded buffering, JSON / urlencoded decoding)
//!     → audit.rs (start record, completion or error record)
//!     → route handlers
//! ```

pub mod audit;
pub mod body;
pub mod cookies;

pub use audit::{audit_errors, audit_requests};
pub use body::{decode_body, BodyLimit, ParsedBody};
pub use cookies::{parse_cookies, Cookies};
