//! # plotkit
//!
//! Toolpath optimizer and flow-controlled motion streamer for pen plotters
//! running GRBL-family firmware.
//!
//! ## Architecture
//!
//! plotkit is organized as a workspace with multiple crates:
//!
//! 1. **plotkit-core** - State model, error taxonomy, event bus
//! 2. **plotkit-camtools** - Path optimizer, backlash and dip handling, motion program emitter
//! 3. **plotkit-communication** - GRBL protocol, WebSocket link, streaming session, controller task
//! 4. **plotkit-settings** - Configuration file model and persistence
//! 5. **plotkit** - Logging setup and the command line front end

pub use plotkit_camtools::{
    paths_from_json, Emitter, EmitterOptions, GenerationResult, MotionProgram, Path, Point,
};
pub use plotkit_communication::{
    ControllerHandle, MachineController, RealtimeCommand, WebSocketConnector,
};
pub use plotkit_core::{
    event_bus, AppEvent, ConnectionState, Error, MachineStatus, Result, StreamProgress,
    StreamingState,
};
pub use plotkit_settings::Config;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging
///
/// Sets up structured logging on stderr with:
/// - RUST_LOG environment variable support, INFO when unset
/// - target, level, thread ids and line numbers on every line
/// - JSON lines instead of text when `json` is set
pub fn init_logging(json: bool) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        let fmt_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .with_thread_ids(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .with_thread_ids(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }

    Ok(())
}
