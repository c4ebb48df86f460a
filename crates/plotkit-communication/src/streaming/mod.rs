//! Program streaming with windowed flow control

pub mod session;

pub use session::{StreamConfig, StreamingSession};
