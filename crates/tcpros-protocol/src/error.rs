use tcpros_core::CodecError;
use thiserror::Error;

pub type ProtocolResult<T> = Result<T, ProtocolError>;

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The header blob does not follow the length/entry layout.
    #[error("malformed connection header: {0}")]
    MalformedHeader(String),

    /// A recognised header key holds a value of the wrong shape.
    #[error("invalid value for header key {key}: {value:?}")]
    InvalidHeaderValue { key: String, value: String },

    #[error("frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: u32, max: u32 },

    /// The stream ended inside a frame.
    #[error("incomplete frame: expected {expected} bytes, got {received}")]
    IncompleteFrame { expected: usize, received: usize },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    pub(crate) fn malformed(reason: impl std::fmt::Display) -> Self {
        Self::MalformedHeader(reason.to_string())
    }
}
