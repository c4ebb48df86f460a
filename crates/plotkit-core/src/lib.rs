//! # Plotkit Core
//!
//! Core types shared by the plotkit crates.
//! Provides the connection, machine and streaming state model, the error
//! taxonomy, and the event bus used to publish state to the presentation layer.

pub mod data;
pub mod error;
pub mod event_bus;

pub use data::{
    CommandRejection, ConnectionState, MachinePosition, MachineState, MachineStatus,
    OverrideValues, StreamProgress, StreamingState,
};

pub use error::{ConnectionError, Error, Result, StreamingError};

// Re-export event bus for convenience
pub use event_bus::{
    event_bus, AppEvent, EventBus, EventBusConfig, EventCategory, EventFilter, SubscriptionId,
};
