//! Data models for link, machine and streaming state
//!
//! This module provides:
//! - Connection state of the device link
//! - Machine state and status as reported by firmware telemetry
//! - Streaming state and progress snapshots for the presentation layer

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// State of the device link
///
/// Owned by the device link and changed only on link events
/// (open/close/error) or explicit connect/disconnect calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No connection, and none being attempted
    #[default]
    Disconnected,
    /// Connection attempt in flight
    Connecting,
    /// Link open and ready for traffic
    Connected,
    /// Link failed; a human-readable reason accompanies the transition
    Error,
}

impl ConnectionState {
    /// Check if a transition from this state to `target` is valid.
    ///
    /// - Disconnected → Connecting
    /// - Connecting → Connected, Error
    /// - Connected → Error
    /// - any → Disconnected
    /// - Error → Connecting
    pub fn can_transition_to(&self, target: ConnectionState) -> bool {
        use ConnectionState::*;
        if *self == target {
            return true;
        }
        matches!(
            (self, target),
            (Disconnected, Connecting)
                | (Connecting, Connected | Error)
                | (Connected, Error)
                | (_, Disconnected)
                | (Error, Connecting)
        )
    }

    /// Whether lines and real-time bytes may be written
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Machine state reported by firmware telemetry
///
/// Purely observational; overwritten on each telemetry frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MachineState {
    /// Idle and ready for commands
    Idle,
    /// Executing motion
    Run,
    /// Feed hold active
    Hold,
    /// Jogging
    Jog,
    /// Alarm condition, requires unlock or reset
    Alarm,
    /// Safety door open
    Door,
    /// Check (dry-run) mode
    Check,
    /// Homing cycle in progress
    Home,
    /// Sleeping
    Sleep,
    /// Not reported yet, or not recognized
    #[default]
    Unknown,
}

impl MachineState {
    /// Parse the state token of a telemetry frame.
    ///
    /// Sub-states such as `Hold:0` or `Door:1` map to their base state.
    pub fn from_token(token: &str) -> Self {
        let base = token.split(':').next().unwrap_or("").trim();
        match base {
            "Idle" => Self::Idle,
            "Run" => Self::Run,
            "Hold" => Self::Hold,
            "Jog" => Self::Jog,
            "Alarm" => Self::Alarm,
            "Door" => Self::Door,
            "Check" => Self::Check,
            "Home" => Self::Home,
            "Sleep" => Self::Sleep,
            _ => Self::Unknown,
        }
    }

    /// Check if this state indicates active motion
    pub fn is_moving(&self) -> bool {
        matches!(self, Self::Run | Self::Jog | Self::Home)
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Run => write!(f, "Run"),
            Self::Hold => write!(f, "Hold"),
            Self::Jog => write!(f, "Jog"),
            Self::Alarm => write!(f, "Alarm"),
            Self::Door => write!(f, "Door"),
            Self::Check => write!(f, "Check"),
            Self::Home => write!(f, "Home"),
            Self::Sleep => write!(f, "Sleep"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// A three-axis machine position
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MachinePosition {
    /// X-axis position
    pub x: f64,
    /// Y-axis position
    pub y: f64,
    /// Z-axis position
    pub z: f64,
}

impl MachinePosition {
    /// Create a new position
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Component-wise sum
    pub fn add(&self, other: &MachinePosition) -> Self {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    /// Component-wise difference
    pub fn subtract(&self, other: &MachinePosition) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl fmt::Display for MachinePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X{:.3} Y{:.3} Z{:.3}", self.x, self.y, self.z)
    }
}

/// Override percentages reported by the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideValues {
    /// Feed override percentage
    pub feed: u16,
    /// Rapid override percentage
    pub rapid: u16,
    /// Spindle override percentage
    pub spindle: u16,
}

impl Default for OverrideValues {
    fn default() -> Self {
        Self {
            feed: 100,
            rapid: 100,
            spindle: 100,
        }
    }
}

/// Machine status model fed by telemetry frames
///
/// Each field keeps its previous value until a frame carries a valid
/// replacement for it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineStatus {
    /// Last reported machine state
    pub state: MachineState,
    /// Machine coordinates
    pub machine_position: MachinePosition,
    /// Work coordinates
    pub work_position: MachinePosition,
    /// Work coordinate offset, if reported
    pub work_offset: Option<MachinePosition>,
    /// Current feed rate (units/min)
    pub feed_rate: f64,
    /// Current spindle speed
    pub spindle_speed: f64,
    /// Override percentages
    pub overrides: OverrideValues,
    /// Wall-clock time of the last applied frame
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// A firmware `error:` response recorded during streaming
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRejection {
    /// Zero-based index of the rejected line in the program
    pub line_index: usize,
    /// The command as sent
    pub command: String,
    /// The firmware response, e.g. `error:20`
    pub response: String,
}

impl fmt::Display for CommandRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {}: {} -> {}",
            self.line_index + 1,
            self.command,
            self.response
        )
    }
}

/// State of a streaming session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StreamingState {
    /// No program loaded
    #[default]
    Idle,
    /// Dispatching lines
    Streaming,
    /// Feed hold active, dispatch suspended
    Paused,
    /// Every line sent and acknowledged
    Completed,
    /// Aborted by a link failure
    Error,
}

impl StreamingState {
    /// Whether a program is loaded and not finished
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Streaming | Self::Paused)
    }
}

impl fmt::Display for StreamingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Streaming => write!(f, "streaming"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Progress snapshot of a streaming session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamProgress {
    /// Session state
    pub state: StreamingState,
    /// Lines processed so far (sent or skipped)
    pub current_line: usize,
    /// Total lines in the program
    pub total_lines: usize,
    /// Completion percentage (0-100)
    pub percentage: f64,
    /// The most recently dispatched command
    pub current_command: Option<String>,
    /// Time since the stream started
    pub elapsed: Duration,
    /// Firmware rejections recorded so far
    pub errors: Vec<CommandRejection>,
}

impl StreamProgress {
    /// Compute a percentage from processed and total line counts
    pub fn percentage_of(current: usize, total: usize) -> f64 {
        if total == 0 {
            return 100.0;
        }
        (current as f64 / total as f64) * 100.0
    }
}
