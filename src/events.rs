//! Verification event log
//!
//! A run reports progress and failures as timestamped, human-readable events.
//! The caller owns the sink; the verifier only appends to it.

use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Severity of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warning,
    Error,
}

/// The verification pipeline an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Pipeline {
    /// Release bundle → Sigstore verification
    Provenance,
    /// Enclave attestation → hardware verification
    Runtime,
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pipeline::Provenance => f.write_str("provenance"),
            Pipeline::Runtime => f.write_str("runtime"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<Pipeline>,
    pub message: String,
}

impl Event {
    fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            pipeline: None,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Level::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Level::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Level::Error, message)
    }

    pub fn in_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - ", self.timestamp.format("%Y/%m/%d %H:%M:%S"))?;
        if let Some(pipeline) = self.pipeline {
            write!(f, "[{}] ", pipeline)?;
        }
        if self.level == Level::Warning {
            f.write_str("WARNING: ")?;
        }
        f.write_str(&self.message)
    }
}

/// Append-only destination for verification events
///
/// Both pipelines append concurrently; implementations must keep each
/// caller's own appends in order.
pub trait EventSink: Send + Sync {
    fn record(&self, event: Event);
}

/// `tracing` target of the log records mirroring sink events
pub const EVENT_TARGET: &str = module_path!();

/// Records emitted events through `tracing` as well as the caller's sink
///
/// Subscribers that already display the sink can silence [`EVENT_TARGET`].
pub(crate) fn emit(sink: &dyn EventSink, event: Event) {
    match event.level {
        Level::Info => {
            tracing::info!(target: EVENT_TARGET, pipeline = ?event.pipeline, "{}", event.message)
        }
        Level::Warning => {
            tracing::warn!(target: EVENT_TARGET, pipeline = ?event.pipeline, "{}", event.message)
        }
        Level::Error => {
            tracing::error!(target: EVENT_TARGET, pipeline = ?event.pipeline, "{}", event.message)
        }
    }
    sink.record(event);
}

/// In-memory event log
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.message).collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: Event) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).push(event);
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _event: Event) {}
}
