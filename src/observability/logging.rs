//! Structured logging.
//!
//! # Responsibilities
//! - Leveled, metadata-carrying log records emitted as `tracing` events
//! - Severity filtering in the subscriber, before any layer formats a record
//! - Fan-out to `tracing-subscriber` layers (console, files, memory)
//!
//! # Design Decisions
//! - The logger owns its own [`Dispatch`], handed to components explicitly
//!   instead of being installed as the global default
//! - `http` sits between `info` and `debug`: it is emitted at `DEBUG` and
//!   `debug` at `TRACE`, so the usual level filters order them correctly
//! - Logging never fails: fmt layers swallow writer errors
//! - Console shows `timestamp [LEVEL] service: message {meta}`, files get NDJSON

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use nu_ansi_term::Color;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Dispatch, Event};
use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, Layer, Registry};

use crate::config::schema::LoggingConfig;
use crate::observability::layers::{self, LogSubscriber};

/// Target of every event the [`Logger`] emits.
pub const RECORD_TARGET: &str = "chess_backend::record";

/// Log severity, most severe first.
///
/// `Http` is the high-volume traffic level used by the request audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Error,
    #[serde(alias = "warning")]
    Warn,
    Info,
    Http,
    #[serde(alias = "verbose", alias = "silly", alias = "trace")]
    Debug,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Error => "error",
            Level::Warn => "warn",
            Level::Info => "info",
            Level::Http => "http",
            Level::Debug => "debug",
        }
    }

    pub fn as_tracing(&self) -> tracing::Level {
        match self {
            Level::Error => tracing::Level::ERROR,
            Level::Warn => tracing::Level::WARN,
            Level::Info => tracing::Level::INFO,
            Level::Http => tracing::Level::DEBUG,
            Level::Debug => tracing::Level::TRACE,
        }
    }

    pub fn from_tracing(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::ERROR => Level::Error,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::INFO => Level::Info,
            tracing::Level::DEBUG => Level::Http,
            _ => Level::Debug,
        }
    }

    /// Filter letting through this level and everything more severe.
    pub fn filter(&self) -> LevelFilter {
        LevelFilter::from_level(self.as_tracing())
    }

    fn color(&self) -> Color {
        match self {
            Level::Error => Color::Red,
            Level::Warn => Color::Yellow,
            Level::Info | Level::Http => Color::Green,
            Level::Debug => Color::Blue,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(Level::Error),
            "warn" | "warning" => Ok(Level::Warn),
            "info" => Ok(Level::Info),
            "http" => Ok(Level::Http),
            "debug" | "verbose" | "silly" | "trace" => Ok(Level::Debug),
            other => Err(format!("unknown log level {other:?}")),
        }
    }
}

/// Render a timestamp the way every record and response body shows it.
pub fn iso8601(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// One log event as the layers see it.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub service: String,
    pub message: String,
    pub metadata: Map<String, Value>,
}

impl LogRecord {
    /// Rebuild the record carried by a `tracing` event. Fields other than
    /// `service`, `message` and `metadata` become metadata entries.
    pub fn from_event(event: &Event<'_>) -> Self {
        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);

        Self {
            timestamp: Utc::now(),
            level: Level::from_tracing(event.metadata().level()),
            service: visitor.service,
            message: visitor.message,
            metadata: visitor.metadata,
        }
    }

    /// `timestamp [LEVEL] service: message {metadata-json}`
    pub fn console_line(&self, colorize: bool) -> String {
        let level = self.level.as_str().to_ascii_uppercase();
        let level = if colorize {
            self.level.color().paint(level).to_string()
        } else {
            level
        };

        let mut line = format!(
            "{} [{}] {}: {}",
            iso8601(&self.timestamp),
            level,
            self.service,
            self.message
        );
        if !self.metadata.is_empty() {
            if let Ok(meta) = serde_json::to_string(&self.metadata) {
                line.push(' ');
                line.push_str(&meta);
            }
        }
        line
    }

    /// Flat JSON object; metadata keys never replace the four record fields.
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("timestamp".into(), Value::String(iso8601(&self.timestamp)));
        object.insert("level".into(), Value::String(self.level.as_str().into()));
        object.insert("service".into(), Value::String(self.service.clone()));
        object.insert("message".into(), Value::String(self.message.clone()));
        for (key, value) in &self.metadata {
            object.entry(key.clone()).or_insert_with(|| value.clone());
        }
        Value::Object(object)
    }
}

#[derive(Default)]
struct RecordVisitor {
    service: String,
    message: String,
    metadata: Map<String, Value>,
}

impl Visit for RecordVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "service" => self.service = value.to_string(),
            "message" => self.message = value.to_string(),
            "metadata" => {
                if let Ok(Value::Object(map)) = serde_json::from_str(value) {
                    self.metadata.extend(map);
                }
            }
            name => {
                self.metadata
                    .insert(name.to_string(), Value::String(value.to_string()));
            }
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.metadata.insert(field.name().to_string(), value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.metadata.insert(field.name().to_string(), value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.metadata.insert(field.name().to_string(), value.into());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record_str(field, &format!("{value:?}"));
    }
}

fn into_metadata(metadata: Option<Value>) -> Map<String, Value> {
    match metadata {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(other) => {
            let mut map = Map::new();
            map.insert("meta".into(), other);
            map
        }
    }
}

macro_rules! record {
    ($level:expr, $service:expr, $message:expr, $metadata:expr) => {
        tracing::event!(
            target: RECORD_TARGET,
            $level,
            service = $service,
            metadata = %$metadata,
            message = $message
        )
    };
}

/// Leveled logger over its own `tracing` dispatcher.
///
/// Cheap to clone; every clone writes through the same layers.
#[derive(Debug, Clone)]
pub struct Logger {
    service: Arc<str>,
    dispatch: Dispatch,
}

impl Logger {
    pub fn builder(service: impl Into<String>) -> LoggerBuilder {
        LoggerBuilder {
            service: service.into(),
            level: Level::Info,
            layers: Vec::new(),
        }
    }

    /// Build the service logger: console always, plus `error.log` and
    /// `combined.log` outside production. A log file that cannot be opened
    /// is skipped with a warning.
    pub fn from_config(config: &LoggingConfig, production: bool) -> Self {
        let mut builder = Logger::builder(config.service_name.clone())
            .level(config.level)
            .layer(layers::console(!production));

        let mut unavailable = Vec::new();
        if !production {
            for (file, max_level) in [("error.log", LevelFilter::ERROR), ("combined.log", LevelFilter::TRACE)] {
                let path = config.directory.join(file);
                match layers::file(&path, max_level) {
                    Ok(layer) => builder = builder.layer(layer),
                    Err(e) => unavailable.push((path, e)),
                }
            }
        }

        let logger = builder.build();
        for (path, e) in unavailable {
            logger.warn(
                "Log file unavailable, continuing without it",
                serde_json::json!({ "path": path.display().to_string(), "error": e.to_string() }),
            );
        }
        logger
    }

    pub fn log(&self, level: Level, message: impl Into<String>, metadata: impl Into<Option<Value>>) {
        let message = message.into();
        let metadata = Value::Object(into_metadata(metadata.into()));
        let service = &*self.service;

        tracing::dispatcher::with_default(&self.dispatch, || match level {
            Level::Error => record!(tracing::Level::ERROR, service, message.as_str(), metadata),
            Level::Warn => record!(tracing::Level::WARN, service, message.as_str(), metadata),
            Level::Info => record!(tracing::Level::INFO, service, message.as_str(), metadata),
            Level::Http => record!(tracing::Level::DEBUG, service, message.as_str(), metadata),
            Level::Debug => record!(tracing::Level::TRACE, service, message.as_str(), metadata),
        });
    }

    pub fn error(&self, message: impl Into<String>, metadata: impl Into<Option<Value>>) {
        self.log(Level::Error, message, metadata);
    }

    pub fn warn(&self, message: impl Into<String>, metadata: impl Into<Option<Value>>) {
        self.log(Level::Warn, message, metadata);
    }

    pub fn info(&self, message: impl Into<String>, metadata: impl Into<Option<Value>>) {
        self.log(Level::Info, message, metadata);
    }

    pub fn http(&self, message: impl Into<String>, metadata: impl Into<Option<Value>>) {
        self.log(Level::Http, message, metadata);
    }

    pub fn debug(&self, message: impl Into<String>, metadata: impl Into<Option<Value>>) {
        self.log(Level::Debug, message, metadata);
    }
}

type BoxedLayer = Box<dyn Layer<LogSubscriber> + Send + Sync>;

pub struct LoggerBuilder {
    service: String,
    level: Level,
    layers: Vec<BoxedLayer>,
}

impl LoggerBuilder {
    /// Least severe level that is still recorded.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn layer(mut self, layer: impl Layer<LogSubscriber> + Send + Sync + 'static) -> Self {
        self.layers.push(Box::new(layer));
        self
    }

    pub fn build(self) -> Logger {
        let subscriber = Registry::default()
            .with(self.level.filter())
            .with(self.layers);

        Logger {
            service: self.service.into(),
            dispatch: Dispatch::new(subscriber),
        }
    }
}
