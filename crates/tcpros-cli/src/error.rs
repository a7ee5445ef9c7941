//! CLI error types.

use std::io;

use tcpros_core::{CodecError, SchemaError, TracingError, ValidationError};
use tcpros_protocol::ProtocolError;
use tcpros_transport::TransportError;
use thiserror::Error;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// Errors reported by `tcpros` commands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("invalid message: {0}")]
    Validation(#[from] ValidationError),

    #[error("decode failed: {0}")]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to initialise logging: {0}")]
    Tracing(#[from] TracingError),

    /// A command-line value is out of range.
    #[error("invalid argument: {0}")]
    Argument(String),
}

impl CliError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
