//! HTTP request/response pipeline.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (middleware composition, routes, graceful shutdown)
//!     → completion.rs (per-request completion hooks on the response body)
//!     → request.rs (request context snapshot)
//!     → response.rs (error classification and rendering)
//!     → middleware/ (cookies, body decoding, audit records)
//!     → route handlers
//! ```

pub mod completion;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use completion::{track_completion, Completion, CompletionHooks};
pub use request::RequestContext;
pub use server::{AppState, HttpServer};
