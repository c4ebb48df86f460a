//! Error types for the toolpath crate.
//!
//! Most pipeline stages cannot fail: degenerate geometry is filtered rather
//! than rejected. These types cover option validation and input decoding.

use thiserror::Error;

/// Errors that can occur while generating a motion program.
#[derive(Error, Debug)]
pub enum CamToolError {
    /// Invalid options were provided to a pipeline stage.
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// The input contained nothing that could be drawn.
    #[error("Nothing to plot: {0}")]
    EmptyInput(String),

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A parameter validation error occurred.
    #[error("Parameter error: {0}")]
    Parameter(#[from] ParameterError),
}

/// Errors related to option validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    /// A parameter value is out of the valid range.
    #[error("Parameter '{name}' out of range: {value} (valid: {min}..{max})")]
    OutOfRange {
        name: String,
        value: f64,
        min: f64,
        max: f64,
    },

    /// A value that must be strictly positive was zero or negative.
    #[error("Parameter '{name}' must be positive, got {value}")]
    NotPositive { name: String, value: f64 },

    /// A tolerance or distance was negative.
    #[error("Parameter '{name}' must not be negative, got {value}")]
    Negative { name: String, value: f64 },
}

impl ParameterError {
    /// Reject zero, negative and NaN values
    pub fn require_positive(name: &str, value: f64) -> ParameterResult<f64> {
        if value > 0.0 {
            Ok(value)
        } else {
            Err(ParameterError::NotPositive {
                name: name.to_string(),
                value,
            })
        }
    }

    /// Reject negative and NaN values
    pub fn require_non_negative(name: &str, value: f64) -> ParameterResult<f64> {
        if value >= 0.0 {
            Ok(value)
        } else {
            Err(ParameterError::Negative {
                name: name.to_string(),
                value,
            })
        }
    }
}

/// Result type alias for toolpath operations.
pub type CamToolResult<T> = Result<T, CamToolError>;

/// Result type alias for parameter validation.
pub type ParameterResult<T> = Result<T, ParameterError>;
