//! Connection headers and frame handling for TCPROS sessions.
//!
//! Everything on the wire is a frame: a 4-byte little-endian length followed
//! by that many bytes. The first frame in each direction is a
//! [`ConnectionHeader`]; every later frame from the publisher is one message
//! body.
//!
//! ```rust
//! use tcpros_protocol::ConnectionHeader;
//!
//! let header = ConnectionHeader::new()
//!     .with_caller_id("/talker")
//!     .with_topic("/chatter");
//! let bytes = header.encode();
//! assert_eq!(ConnectionHeader::decode(&bytes).unwrap(), header);
//! ```

mod error;
mod frame;
mod header;

pub use error::{ProtocolError, ProtocolResult};
pub use frame::{FrameReader, FrameWriter, decode_frame};
pub use header::{ConnectionHeader, WILDCARD_DIGEST};

/// Largest frame accepted from a peer (64 MiB).
pub const MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

/// Marker whose presence identifies a lone connection header in a raw chunk.
pub const HEADER_MARKER: &[u8] = b"type=";
