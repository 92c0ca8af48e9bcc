//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (leveled records as events on the Logger's own dispatcher)
//!         → layers.rs (console line, NDJSON files, memory)
//!     → metrics.rs (counters, histograms)
//!     → subscriber.rs (framework diagnostics on the global subscriber)
//! ```
//!
//! # Design Decisions
//! - One Logger value per process, cloned into every component
//! - Logging can never fail the request path
//! - Metrics are cheap (no-ops without a recorder)

pub mod layers;
pub mod logging;
pub mod metrics;
pub mod subscriber;

pub use layers::{ConsoleFormat, JsonFormat, LogSubscriber, MemoryLayer};
pub use logging::{Level, LogRecord, Logger};
