//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Build pipeline → Bind listener → Banner → Serve
//!
//! Shutdown (shutdown.rs):
//!     Starting → Listening → Draining → Stopped
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Draining
//! ```
//!
//! # Design Decisions
//! - State only moves forward; a repeated or backwards transition is an error
//! - Draining lets in-flight responses finish before the listener closes

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{LifecycleError, ServerState, Shutdown};
pub use startup::StartupError;
