//! Event type definitions for the event bus.
//!
//! Events are cloneable and serializable so the presentation layer can log
//! or replay them.

use serde::{Deserialize, Serialize};

use crate::data::{ConnectionState, MachineStatus, StreamProgress, StreamingState};

/// Root event enum for all application events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AppEvent {
    /// Device link events
    Connection(ConnectionEvent),
    /// Machine telemetry and firmware messages
    Machine(MachineEvent),
    /// Streaming session events
    Streaming(StreamingEvent),
    /// Structured log lines
    Log(LogEvent),
}

impl AppEvent {
    /// Get the category of this event
    pub fn category(&self) -> EventCategory {
        match self {
            AppEvent::Connection(_) => EventCategory::Connection,
            AppEvent::Machine(_) => EventCategory::Machine,
            AppEvent::Streaming(_) => EventCategory::Streaming,
            AppEvent::Log(_) => EventCategory::Log,
        }
    }

    /// Get a short description of this event for logging
    pub fn description(&self) -> String {
        match self {
            AppEvent::Connection(e) => e.description(),
            AppEvent::Machine(e) => e.description(),
            AppEvent::Streaming(e) => e.description(),
            AppEvent::Log(e) => format!("[{}] {}: {}", e.level, e.source, e.message),
        }
    }

    /// Shorthand for an info-level log event
    pub fn info(source: &str, message: impl Into<String>) -> Self {
        AppEvent::Log(LogEvent::new(LogLevel::Info, source, message))
    }

    /// Shorthand for a warning-level log event
    pub fn warn(source: &str, message: impl Into<String>) -> Self {
        AppEvent::Log(LogEvent::new(LogLevel::Warn, source, message))
    }

    /// Shorthand for an error-level log event
    pub fn error(source: &str, message: impl Into<String>) -> Self {
        AppEvent::Log(LogEvent::new(LogLevel::Error, source, message))
    }
}

/// Event category for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// Device link events.
    Connection,
    /// Machine telemetry events.
    Machine,
    /// Streaming session events.
    Streaming,
    /// Log lines.
    Log,
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventCategory::Connection => write!(f, "Connection"),
            EventCategory::Machine => write!(f, "Machine"),
            EventCategory::Streaming => write!(f, "Streaming"),
            EventCategory::Log => write!(f, "Log"),
        }
    }
}

/// Device link events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConnectionEvent {
    /// Connection state changed.
    StateChanged {
        /// Address of the controller.
        address: String,
        /// The new state.
        state: ConnectionState,
        /// Human-readable detail, set for errors.
        message: Option<String>,
    },
    /// A reconnect attempt was scheduled.
    ReconnectScheduled {
        /// Address of the controller.
        address: String,
        /// Backoff before the attempt, in milliseconds.
        delay_ms: u64,
    },
}

impl ConnectionEvent {
    fn description(&self) -> String {
        match self {
            ConnectionEvent::StateChanged {
                address,
                state,
                message: Some(message),
            } => format!("{} {}: {}", address, state, message),
            ConnectionEvent::StateChanged { address, state, .. } => {
                format!("{} {}", address, state)
            }
            ConnectionEvent::ReconnectScheduled { address, delay_ms } => {
                format!("Reconnecting to {} in {}ms", address, delay_ms)
            }
        }
    }
}

/// Machine telemetry events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MachineEvent {
    /// A telemetry frame updated the status model.
    StatusUpdated(MachineStatus),
    /// The firmware reported an alarm.
    Alarm {
        /// Raw alarm line.
        line: String,
        /// Decoded description.
        description: String,
    },
    /// Any other unsolicited firmware line.
    Message(String),
}

impl MachineEvent {
    fn description(&self) -> String {
        match self {
            MachineEvent::StatusUpdated(status) => {
                format!("{} at {}", status.state, status.work_position)
            }
            MachineEvent::Alarm { line, description } => {
                format!("{} ({})", line, description)
            }
            MachineEvent::Message(line) => line.clone(),
        }
    }
}

/// Streaming session events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StreamingEvent {
    /// The session moved to a new state.
    StateChanged {
        /// The previous state.
        from: StreamingState,
        /// The new state.
        to: StreamingState,
        /// Progress at the time of the transition.
        progress: StreamProgress,
    },
    /// Periodic or per-acknowledgment progress update.
    Progress(StreamProgress),
}

impl StreamingEvent {
    fn description(&self) -> String {
        match self {
            StreamingEvent::StateChanged { from, to, .. } => {
                format!("Stream {} -> {}", from, to)
            }
            StreamingEvent::Progress(p) => format!(
                "Line {}/{} ({:.1}%)",
                p.current_line, p.total_lines, p.percentage
            ),
        }
    }
}

/// Severity of a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    /// Verbose detail.
    Debug,
    /// Normal operation.
    Info,
    /// Recoverable problem.
    Warn,
    /// Failure.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// A structured log line for the presentation layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    /// Severity.
    pub level: LogLevel,
    /// Emitting component, e.g. `link` or `stream`.
    pub source: String,
    /// Message text.
    pub message: String,
    /// Wall-clock time of the event.
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl LogEvent {
    /// Create a log event stamped with the current time
    pub fn new(level: LogLevel, source: &str, message: impl Into<String>) -> Self {
        Self {
            level,
            source: source.to_string(),
            message: message.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}
