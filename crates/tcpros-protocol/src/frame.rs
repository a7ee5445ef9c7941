//! Length-prefixed frames over async streams, and raw chunk decoding.
//!
//! ```text
//! +----------------+------------------+
//! | length (4 LE)  |  payload         |
//! +----------------+------------------+
//! ```

use tcpros_core::{MessageInstance, Reader, TypeDescriptor, codec};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{ProtocolError, ProtocolResult};
use crate::header::ConnectionHeader;
use crate::{HEADER_MARKER, MAX_FRAME_SIZE};

/// Decodes a raw chunk that may start with a connection header.
///
/// If the first length is shorter than the rest of the chunk, it is taken as
/// a header and skipped, and the message frame after it is decoded. Otherwise
/// a chunk containing `type=` is a lone header and yields `None`; anything
/// else must be exactly one message frame.
///
/// Only the first message is decoded; bytes after it are ignored.
pub fn decode_frame(buf: &[u8], descriptor: &TypeDescriptor) -> ProtocolResult<Option<MessageInstance>> {
    let mut reader = Reader::new(buf);
    let first = reader.read_u32()? as usize;

    if first < reader.remaining() {
        reader.take(first)?;
        let len = reader.read_u32()? as usize;
        let body = reader.take(len)?;
        trace!(header_len = first, body_len = len, "Skipped leading connection header");
        return Ok(Some(codec::decode_body(body, descriptor)?));
    }

    if contains(&buf[4..], HEADER_MARKER) {
        trace!(len = first, "Chunk holds only a connection header");
        return Ok(None);
    }

    Ok(Some(codec::decode(buf, descriptor)?))
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Reads frames from an async byte stream.
pub struct FrameReader<R> {
    reader: R,
    max_frame: u32,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            max_frame: MAX_FRAME_SIZE,
        }
    }

    /// Builder: lower the frame size limit.
    #[must_use]
    pub fn with_max_frame(mut self, max_frame: u32) -> Self {
        self.max_frame = max_frame;
        self
    }

    /// Reads one frame and returns its payload.
    ///
    /// Returns `Ok(None)` on a clean end of stream before a frame starts.
    /// Empty payloads are valid (a message type without fields).
    pub async fn read_frame(&mut self) -> ProtocolResult<Option<Vec<u8>>> {
        let mut len_buf = [0u8; 4];
        let mut filled = 0;
        while filled < len_buf.len() {
            let n = self.reader.read(&mut len_buf[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(ProtocolError::IncompleteFrame {
                    expected: 4,
                    received: filled,
                });
            }
            filled += n;
        }

        let len = u32::from_le_bytes(len_buf);
        if len > self.max_frame {
            return Err(ProtocolError::FrameTooLarge {
                size: len,
                max: self.max_frame,
            });
        }

        let mut payload = vec![0u8; len as usize];
        let mut received = 0;
        while received < payload.len() {
            let n = self.reader.read(&mut payload[received..]).await?;
            if n == 0 {
                return Err(ProtocolError::IncompleteFrame {
                    expected: payload.len(),
                    received,
                });
            }
            received += n;
        }
        Ok(Some(payload))
    }

    /// Reads the peer's connection header.
    ///
    /// A stream that closes before sending one is a malformed handshake.
    pub async fn read_header(&mut self) -> ProtocolResult<ConnectionHeader> {
        match self.read_frame().await? {
            Some(body) => ConnectionHeader::decode_fields(&body),
            None => Err(ProtocolError::malformed("connection closed before header")),
        }
    }

    /// Reads and decodes the next message frame.
    pub async fn read_message(&mut self, descriptor: &TypeDescriptor) -> ProtocolResult<Option<MessageInstance>> {
        match self.read_frame().await? {
            Some(body) => Ok(Some(codec::decode_body(&body, descriptor)?)),
            None => Ok(None),
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Writes frames to an async byte stream.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write_header(&mut self, header: &ConnectionHeader) -> ProtocolResult<()> {
        self.write_encoded(&header.encode()).await
    }

    /// Writes bytes that already carry their length prefix.
    pub async fn write_encoded(&mut self, frame: &[u8]) -> ProtocolResult<()> {
        self.writer.write_all(frame).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn write_message(&mut self, instance: &MessageInstance, descriptor: &TypeDescriptor) -> ProtocolResult<()> {
        let frame = codec::encode(instance, descriptor)?;
        self.write_encoded(&frame).await
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tcpros_core::{CodecError, Value};

    fn pair() -> TypeDescriptor {
        TypeDescriptor::from_text("test_msgs/Pair", "int32 a\nint32 b\n", |_| None).unwrap()
    }

    fn header_of_len_20() -> Vec<u8> {
        let entry = "callerid=/talker";
        assert_eq!(4 + entry.len(), 20);
        let mut out = 20u32.to_le_bytes().to_vec();
        out.extend_from_slice(&(entry.len() as u32).to_le_bytes());
        out.extend_from_slice(entry.as_bytes());
        out
    }

    #[test]
    fn skips_a_leading_header() {
        let d = pair();
        let msg = d.instance_with([("a", 7i32), ("b", -2i32)]).unwrap();
        let body = codec::encode(&msg, &d).unwrap();
        assert_eq!(body.len(), 4 + 8);

        let mut buf = header_of_len_20();
        buf.extend_from_slice(&body);
        assert_eq!(decode_frame(&buf, &d).unwrap(), Some(msg));
    }

    #[test]
    fn lone_header_yields_nothing() {
        let d = pair();
        let header = ConnectionHeader::new()
            .with_caller_id("/talker")
            .with_descriptor(&d)
            .encode();
        assert_eq!(decode_frame(&header, &d).unwrap(), None);
    }

    #[test]
    fn plain_message_frame() {
        let d = pair();
        let msg = d.instance_with([("a", 1i32)]).unwrap();
        let frame = codec::encode(&msg, &d).unwrap();
        let decoded = decode_frame(&frame, &d).unwrap().unwrap();
        assert_eq!(decoded.get("a"), Some(&Value::Int32(1)));
    }

    #[test]
    fn bad_lengths_fail_closed() {
        let d = pair();
        assert!(matches!(
            decode_frame(&[1, 0], &d),
            Err(ProtocolError::Codec(CodecError::Truncated { .. }))
        ));

        let mut buf = header_of_len_20();
        buf.extend_from_slice(&100u32.to_le_bytes());
        buf.extend_from_slice(&[0; 8]);
        assert!(matches!(
            decode_frame(&buf, &d),
            Err(ProtocolError::Codec(CodecError::Truncated { .. }))
        ));

        let mut short = 8u32.to_le_bytes().to_vec();
        short.extend_from_slice(&[0; 4]);
        assert!(decode_frame(&short, &d).is_err());
    }

    #[tokio::test]
    async fn reader_and_writer_share_one_stream() {
        let d = pair();
        let header = ConnectionHeader::new().with_caller_id("/talker").with_descriptor(&d);
        let first = d.instance_with([("a", 1i32), ("b", 2i32)]).unwrap();
        let empty = TypeDescriptor::from_text("std_msgs/Empty", "", |_| None).unwrap();

        let (client, server) = tokio::io::duplex(64);
        let writer_task = {
            let d = d.clone();
            let first = first.clone();
            let header = header.clone();
            let empty = empty.clone();
            tokio::spawn(async move {
                let mut writer = FrameWriter::new(client);
                writer.write_header(&header).await.unwrap();
                writer.write_message(&first, &d).await.unwrap();
                writer.write_message(&empty.default_instance(), &empty).await.unwrap();
            })
        };

        let mut reader = FrameReader::new(server);
        assert_eq!(reader.read_header().await.unwrap(), header);
        assert_eq!(reader.read_message(&d).await.unwrap(), Some(first));
        assert_eq!(reader.read_frame().await.unwrap(), Some(Vec::new()));
        writer_task.await.unwrap();
        assert_eq!(reader.read_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn reader_rejects_oversized_and_cut_frames() {
        let mut data = 1000u32.to_le_bytes().to_vec();
        data.extend_from_slice(&[0; 10]);
        let mut reader = FrameReader::new(data.as_slice()).with_max_frame(100);
        assert!(matches!(
            reader.read_frame().await,
            Err(ProtocolError::FrameTooLarge { size: 1000, max: 100 })
        ));

        let mut reader = FrameReader::new(data.as_slice());
        assert!(matches!(
            reader.read_frame().await,
            Err(ProtocolError::IncompleteFrame { expected: 1000, received: 10 })
        ));

        let mut reader = FrameReader::new(&[1u8, 0][..]);
        assert!(matches!(
            reader.read_frame().await,
            Err(ProtocolError::IncompleteFrame { expected: 4, received: 2 })
        ));
    }
}
