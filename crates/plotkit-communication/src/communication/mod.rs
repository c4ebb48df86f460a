//! Transport layer
//!
//! The [`DeviceLink`] state machine and the transports it can drive.

pub mod link;
pub mod websocket;

pub use link::{CommandSink, Connector, DeviceLink, LinkConfig, LinkEvent, Outbound};
pub use websocket::{normalize_address, WebSocketConnector};
