//! Output layers for the service logger.
//!
//! Every layer renders the [`LogRecord`] carried by a logger event; the
//! subscriber stack is `Registry → LevelFilter → layers`.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{Event, Subscriber};
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self as tracing_fmt, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::{Context, Layered},
    registry::LookupSpan,
    Layer, Registry,
};

use crate::observability::logging::LogRecord;

/// Subscriber every logger layer runs on.
pub type LogSubscriber = Layered<LevelFilter, Registry>;

/// `timestamp [LEVEL] service: message {meta}` lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleFormat;

impl<S, N> FormatEvent<S, N> for ConsoleFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let record = LogRecord::from_event(event);
        writeln!(writer, "{}", record.console_line(writer.has_ansi_escapes()))
    }
}

/// One flat JSON object per line.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormat;

impl<S, N> FormatEvent<S, N> for JsonFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        writeln!(writer, "{}", LogRecord::from_event(event).to_json())
    }
}

/// Human readable lines on stdout.
pub fn console(ansi: bool) -> impl Layer<LogSubscriber> + Send + Sync {
    tracing_fmt::layer::<LogSubscriber>()
        .with_ansi(ansi)
        .with_writer(io::stdout)
        .event_format(ConsoleFormat)
}

/// NDJSON appended to `path` (parent directories are created), keeping
/// records up to `max_level`.
pub fn file(path: &Path, max_level: LevelFilter) -> io::Result<impl Layer<LogSubscriber> + Send + Sync> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    Ok(tracing_fmt::layer::<LogSubscriber>()
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .event_format(JsonFormat)
        .with_filter(max_level))
}

/// Keeps records in memory. Used as a fake sink in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryLayer {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl MemoryLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.message).collect()
    }

    /// Records whose message equals `message`.
    pub fn with_message(&self, message: &str) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.message == message)
            .collect()
    }
}

impl<S: Subscriber> Layer<S> for MemoryLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(LogRecord::from_event(event));
    }
}
