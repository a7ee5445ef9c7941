//! Transport error types.

use std::io;

use tcpros_core::{CodecError, SchemaError};
use tcpros_protocol::ProtocolError;
use thiserror::Error;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors raised by publisher and subscriber sessions.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No port in the search range could be bound.
    #[error("no free port on {host} in {base}..{base}+{attempts}")]
    PortSearch { host: String, base: u16, attempts: u16 },

    /// Socket error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// The message type could not be loaded.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("timeout during {operation}")]
    Timeout { operation: String },

    /// The peer speaks a different version of the message type.
    #[error("digest mismatch: expected {expected}, peer sent {received}")]
    DigestMismatch { expected: String, received: String },

    /// `connect` was called on a subscriber that is not disconnected.
    #[error("subscriber is already connected to {topic}")]
    AlreadyConnected { topic: String },

    /// A subscriber fell `capacity` frames behind under the disconnect policy.
    #[error("send queue overflowed after {capacity} frames")]
    QueueOverflow { capacity: usize },

    /// The session was shut down.
    #[error("session closed")]
    Closed,
}

impl TransportError {
    /// Creates a timeout error for the named operation.
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Creates a digest mismatch error; a missing digest is reported as `""`.
    pub fn digest_mismatch(expected: impl Into<String>, received: Option<&str>) -> Self {
        Self::DigestMismatch {
            expected: expected.into(),
            received: received.unwrap_or_default().to_string(),
        }
    }
}
