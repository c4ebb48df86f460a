//! Error handling for plotkit
//!
//! Provides error types for the link and streaming layers:
//! - Connection errors (transport open/drop, bad addresses)
//! - Streaming errors (operations invalid in the current session state)
//!
//! All error types use `thiserror` for ergonomic error handling.

use crate::data::StreamingState;
use thiserror::Error;

/// Connection error type
///
/// Represents errors related to the device link, including address
/// validation, transport failures and unexpected drops.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Link is not open
    #[error("Device link not connected")]
    NotConnected,

    /// Controller address could not be parsed
    #[error("Invalid controller address: {address}")]
    InvalidAddress {
        /// The rejected address.
        address: String,
    },

    /// Failed to open the link
    #[error("Failed to connect to {address}: {reason}")]
    FailedToOpen {
        /// The address that failed to open.
        address: String,
        /// The reason reported by the transport.
        reason: String,
    },

    /// Connection lost
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// WebSocket error
    #[error("WebSocket error: {reason}")]
    WebSocketError {
        /// The reason for the WebSocket error.
        reason: String,
    },

    /// Generic connection error
    #[error("Connection error: {message}")]
    Other {
        /// The error message.
        message: String,
    },
}

/// Streaming error type
///
/// Returned when a session operation is requested in a state that
/// does not allow it. The session state is left untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamingError {
    /// A stream is already running or paused
    #[error("A stream is already {state}")]
    AlreadyActive {
        /// The current session state.
        state: StreamingState,
    },

    /// Operation requires a running stream
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        /// The requested operation.
        operation: &'static str,
        /// The current session state.
        state: StreamingState,
    },

    /// The device link is not open
    #[error("Cannot stream: device link not connected")]
    NotConnected,
}

/// Main error type for plotkit
///
/// A unified error type that can represent any error from the core layers.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Streaming error
    #[error(transparent)]
    Streaming(#[from] StreamingError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is a streaming error
    pub fn is_streaming_error(&self) -> bool {
        matches!(self, Error::Streaming(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
