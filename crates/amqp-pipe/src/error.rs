//! Error types for the pipe layer.

use thiserror::Error;

/// Pipe error type.
#[derive(Error, Debug)]
pub enum PipeError {
    /// Broker connection or operation error
    #[error("Broker error: {0}")]
    Broker(#[from] lapin::Error),

    /// Broker URL was empty or missing
    #[error("Broker URL is empty")]
    UrlMissing,

    /// Message kind does not match the pipe's target kind
    #[error("Message does not match pipe target: {0}")]
    TargetMismatch(&'static str),

    /// Consume was requested on a pipe that never started consuming
    #[error("Pipe has no active consumer")]
    NotConsuming,

    /// Unrecognized exchange kind name
    #[error("Unknown exchange kind: {0}")]
    UnknownExchangeKind(String),
}

/// Result type for pipe operations.
pub type PipeResult<T> = Result<T, PipeError>;
