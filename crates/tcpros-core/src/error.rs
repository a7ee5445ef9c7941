//! Error types for schema loading, validation and the binary codec.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while locating, reading, parsing or compiling a schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The schema file could not be read.
    #[error("failed to read schema {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A schema line could not be turned into a field.
    #[error("line {line}: {reason}: {content:?}")]
    Parse {
        line: usize,
        content: String,
        reason: &'static str,
    },

    /// A constant literal does not parse as its declared type.
    #[error("constant {field} = {literal:?} is not a valid {type_name}")]
    InvalidConstant {
        field: String,
        type_name: String,
        literal: String,
    },

    /// A field refers to a message type that could not be resolved.
    #[error("field {field} refers to unknown type {type_name}")]
    UnresolvedType { field: String, type_name: String },

    /// A message type contains itself, directly or through nested fields.
    #[error("message type {schema_id} is recursive")]
    RecursiveType { schema_id: String },

    /// Two fields map to the same accessor name.
    #[error("duplicate field {accessor} in {schema_id}")]
    DuplicateField { schema_id: String, accessor: String },

    /// The message id is not of the form `package/Name` or `Name`.
    #[error("invalid message id: {0:?}")]
    InvalidMessageId(String),

    /// The package resolver could not locate a package.
    #[error("package not found: {0}")]
    PackageNotFound(String),
}

impl SchemaError {
    /// Creates a parse error for a 1-based line number.
    pub fn parse(line: usize, content: impl Into<String>, reason: &'static str) -> Self {
        Self::Parse {
            line,
            content: content.into(),
            reason,
        }
    }
}

/// Errors raised while validating a message instance against its type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// The instance carries a key that is not part of the message definition.
    #[error("field {field} does not exist in message {schema_id}")]
    UnknownField { schema_id: String, field: String },

    /// A value does not match the declared kind of its field.
    #[error("field {field} expected {expected}, found {found}")]
    WrongType {
        field: String,
        expected: String,
        found: String,
    },

    /// A number does not fit in the declared field type.
    #[error("field {field} with value {value} is out of range for {type_name}")]
    OutOfRange {
        field: String,
        value: String,
        type_name: String,
    },

    /// A fixed-size array holds the wrong number of elements.
    #[error("field {field} expects {expected} elements, found {found}")]
    ArrayLength {
        field: String,
        expected: usize,
        found: usize,
    },

    /// A constant field holds something other than its literal.
    #[error("constant {field} cannot be modified")]
    ConstantModified { field: String },

    /// The input is not shaped like a message at all.
    #[error("message {schema_id} is invalid: {reason}")]
    InvalidMessage { schema_id: String, reason: String },
}

/// Errors raised while sizing, encoding or decoding a message.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A read would run past the end of the buffer.
    #[error("truncated frame: needed {needed} bytes at offset {offset}, {remaining} remaining")]
    Truncated {
        needed: usize,
        remaining: usize,
        offset: usize,
    },

    /// The length prefix does not match the bytes that follow it.
    #[error("length prefix says {declared} bytes, frame holds {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// Decoding finished before the end of the body.
    #[error("{0} unread bytes after message body")]
    TrailingBytes(usize),

    /// A string field is not valid UTF-8.
    #[error("field {field} is not valid UTF-8")]
    InvalidUtf8 { field: String },

    /// An array count cannot possibly fit in the remaining bytes.
    #[error("field {field} declares {count} elements, only {remaining} bytes remain")]
    CountTooLarge {
        field: String,
        count: usize,
        remaining: usize,
    },

    /// A `bool` byte other than 0 or 1.
    #[error("field {field} holds {value}, not a bool")]
    InvalidBool { field: String, value: u8 },

    /// A length or count does not fit in the 4-byte wire prefix.
    #[error("length {len} of {field} does not fit in 4 bytes")]
    TooLarge { field: String, len: usize },

    /// The instance has no value for a field that must be written.
    #[error("field {0} has no value")]
    MissingField(String),

    /// The instance does not match its type.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}
