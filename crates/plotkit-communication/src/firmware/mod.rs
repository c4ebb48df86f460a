//! Firmware protocol support
//!
//! plotkit speaks the GRBL 1.1 dialect: line commands acknowledged with
//! `ok`/`error:`, `<...>` telemetry frames and single-byte real-time commands.

pub mod grbl;
pub mod realtime;

pub use grbl::{GrblResponse, StatusParser, StatusReport};
pub use realtime::RealtimeCommand;
