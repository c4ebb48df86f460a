//! # Plotkit Communication
//!
//! Talks to GRBL-family controllers over a WebSocket bridge.
//!
//! - **firmware**: response classification, telemetry frames, real-time bytes
//! - **communication**: the device link state machine and its transports
//! - **streaming**: windowed flow-controlled program streaming
//! - **controller**: the task that ties them together

pub mod communication;
pub mod controller;
pub mod firmware;
pub mod streaming;

pub use communication::{
    CommandSink, Connector, DeviceLink, LinkConfig, LinkEvent, Outbound, WebSocketConnector,
};
pub use controller::{ControlCommand, ControllerHandle, MachineController};
pub use firmware::{GrblResponse, RealtimeCommand, StatusParser, StatusReport};
pub use streaming::{StreamConfig, StreamingSession};
