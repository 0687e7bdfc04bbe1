//! Error types for the relay layer.

use thiserror::Error;

/// Relay error type.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Outbound buffer is at capacity; the message was discarded
    #[error("Outbound queue is full (capacity {capacity}); message discarded")]
    QueueFull { capacity: usize },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pipe-level error surfaced past the relay boundary
    #[error("Pipe error: {0}")]
    Pipe(#[from] amqp_pipe::PipeError),
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;
