//! Binary codec driven by a [`TypeDescriptor`].
//!
//! Layout of an encoded message:
//!
//! ```text
//! +------------------+---------------------------------------------+
//! | body size (4 LE) | fields in schema order                      |
//! +------------------+---------------------------------------------+
//! ```
//!
//! - integers and floats: little-endian, fixed width
//! - `string`: 4-byte LE byte length, then UTF-8 bytes
//! - `time` / `duration`: seconds then nanoseconds, 4 bytes each
//! - arrays (fixed or variable): 4-byte LE element count, then elements
//! - nested messages: their body, inline, without a size prefix
//!
//! Constant fields belong to the type, not to the wire: they are skipped on
//! encode and filled from the type on decode.

use crate::descriptor::{ElementKind, FieldKind, TypeDescriptor};
use crate::error::{CodecError, CodecResult, ValidationError};
use crate::value::{Duration, MessageInstance, PrimitiveType, Time, Value};

/// Size of the length prefix in front of every frame.
pub const LENGTH_PREFIX: usize = 4;

/// Computes the encoded body size of an instance (without the prefix).
pub fn size(instance: &MessageInstance, descriptor: &TypeDescriptor) -> CodecResult<usize> {
    message_size(instance, descriptor, "")
}

/// Encodes an instance as a length-prefixed frame.
pub fn encode(instance: &MessageInstance, descriptor: &TypeDescriptor) -> CodecResult<Vec<u8>> {
    let body_size = size(instance, descriptor)?;
    let mut buffer = Vec::with_capacity(LENGTH_PREFIX + body_size);
    buffer.extend_from_slice(&wire_len(body_size, "message body")?);
    encode_body(instance, descriptor, &mut buffer)?;
    debug_assert_eq!(buffer.len(), LENGTH_PREFIX + body_size);
    Ok(buffer)
}

/// Appends the body of an instance to `out`.
pub fn encode_body(
    instance: &MessageInstance,
    descriptor: &TypeDescriptor,
    out: &mut Vec<u8>,
) -> CodecResult<()> {
    write_message(instance, descriptor, out, "")
}

/// Decodes a complete length-prefixed frame.
///
/// The prefix must match the number of bytes that follow it exactly.
pub fn decode(frame: &[u8], descriptor: &TypeDescriptor) -> CodecResult<MessageInstance> {
    let mut reader = Reader::new(frame);
    let declared = reader.read_u32()? as usize;
    let actual = reader.remaining();
    if declared != actual {
        return Err(CodecError::LengthMismatch { declared, actual });
    }
    decode_body(reader.take(declared)?, descriptor)
}

/// Decodes a message body (no prefix); every byte must be consumed.
pub fn decode_body(body: &[u8], descriptor: &TypeDescriptor) -> CodecResult<MessageInstance> {
    let mut reader = Reader::new(body);
    let instance = read_message(&mut reader, descriptor, "")?;
    match reader.remaining() {
        0 => Ok(instance),
        n => Err(CodecError::TrailingBytes(n)),
    }
}

/// Decodes one message body from the reader, leaving the cursor after it.
pub fn decode_from(reader: &mut Reader<'_>, descriptor: &TypeDescriptor) -> CodecResult<MessageInstance> {
    read_message(reader, descriptor, "")
}

/// Bounds-checked cursor over a byte slice.
#[derive(Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Creates a reader positioned at the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current offset from the start of the buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Consumes `n` bytes.
    pub fn take(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        if n > self.remaining() {
            return Err(CodecError::Truncated {
                needed: n,
                remaining: self.remaining(),
                offset: self.pos,
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32(&mut self) -> CodecResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }
}

/// Little-endian `u32` for a length or count that must fit on the wire.
fn wire_len(len: usize, path: &str) -> CodecResult<[u8; 4]> {
    u32::try_from(len)
        .map(u32::to_le_bytes)
        .map_err(|_| CodecError::TooLarge {
            field: path.to_string(),
            len,
        })
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn wrong_type(path: &str, expected: impl ToString, found: &Value) -> CodecError {
    CodecError::Validation(ValidationError::WrongType {
        field: path.to_string(),
        expected: expected.to_string(),
        found: found.kind_name().to_string(),
    })
}

// ---------------------------------------------------------------------------
// Size
// ---------------------------------------------------------------------------

fn message_size(instance: &MessageInstance, descriptor: &TypeDescriptor, prefix: &str) -> CodecResult<usize> {
    let mut total = 0;
    for field in descriptor.fields().iter().filter(|f| !f.is_constant()) {
        let path = join(prefix, &field.accessor);
        let value = instance
            .get(&field.accessor)
            .ok_or_else(|| CodecError::MissingField(path.clone()))?;
        total += field_size(&field.kind, value, &path)?;
    }
    Ok(total)
}

fn field_size(kind: &FieldKind, value: &Value, path: &str) -> CodecResult<usize> {
    match (kind, value) {
        (FieldKind::Primitive(p), v) => primitive_size(*p, v, path),
        (FieldKind::Array { element, .. }, Value::Array(items)) => {
            let mut total = 4;
            for (i, item) in items.iter().enumerate() {
                total += element_size(element, item, &format!("{path}[{i}]"))?;
            }
            Ok(total)
        }
        (FieldKind::Message(d), Value::Message(inner)) => message_size(inner, d, path),
        (kind, value) => Err(wrong_type(path, kind, value)),
    }
}

fn element_size(element: &ElementKind, value: &Value, path: &str) -> CodecResult<usize> {
    match (element, value) {
        (ElementKind::Primitive(p), v) => primitive_size(*p, v, path),
        (ElementKind::Message(d), Value::Message(inner)) => message_size(inner, d, path),
        (element, value) => Err(wrong_type(path, element, value)),
    }
}

fn primitive_size(p: PrimitiveType, value: &Value, path: &str) -> CodecResult<usize> {
    match (p.fixed_size(), value) {
        (None, Value::String(s)) => Ok(4 + s.len()),
        (Some(width), v) if v.primitive_type() == Some(p) => Ok(width),
        (_, v) => Err(wrong_type(path, p, v)),
    }
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

fn write_message(
    instance: &MessageInstance,
    descriptor: &TypeDescriptor,
    out: &mut Vec<u8>,
    prefix: &str,
) -> CodecResult<()> {
    for field in descriptor.fields().iter().filter(|f| !f.is_constant()) {
        let path = join(prefix, &field.accessor);
        let value = instance
            .get(&field.accessor)
            .ok_or_else(|| CodecError::MissingField(path.clone()))?;
        write_field(&field.kind, value, out, &path)?;
    }
    Ok(())
}

fn write_field(kind: &FieldKind, value: &Value, out: &mut Vec<u8>, path: &str) -> CodecResult<()> {
    match (kind, value) {
        (FieldKind::Primitive(p), v) => write_primitive(*p, v, out, path),
        (FieldKind::Array { element, fixed_len }, Value::Array(items)) => {
            if let Some(expected) = fixed_len {
                if items.len() != *expected {
                    return Err(CodecError::Validation(ValidationError::ArrayLength {
                        field: path.to_string(),
                        expected: *expected,
                        found: items.len(),
                    }));
                }
            }
            out.extend_from_slice(&wire_len(items.len(), path)?);
            for (i, item) in items.iter().enumerate() {
                let item_path = format!("{path}[{i}]");
                match (element, item) {
                    (ElementKind::Primitive(p), v) => write_primitive(*p, v, out, &item_path)?,
                    (ElementKind::Message(d), Value::Message(inner)) => {
                        write_message(inner, d, out, &item_path)?
                    }
                    (element, item) => return Err(wrong_type(&item_path, element, item)),
                }
            }
            Ok(())
        }
        (FieldKind::Message(d), Value::Message(inner)) => write_message(inner, d, out, path),
        (kind, value) => Err(wrong_type(path, kind, value)),
    }
}

fn write_primitive(p: PrimitiveType, value: &Value, out: &mut Vec<u8>, path: &str) -> CodecResult<()> {
    if value.primitive_type() != Some(p) {
        return Err(wrong_type(path, p, value));
    }
    match value {
        Value::Bool(v) => out.push(u8::from(*v)),
        Value::Int8(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::UInt8(v) => out.push(*v),
        Value::Int16(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::UInt16(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Int32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::UInt32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Int64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::UInt64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Float32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Float64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::String(s) => {
            out.extend_from_slice(&wire_len(s.len(), path)?);
            out.extend_from_slice(s.as_bytes());
        }
        Value::Time(t) => {
            out.extend_from_slice(&t.secs.to_le_bytes());
            out.extend_from_slice(&t.nsecs.to_le_bytes());
        }
        Value::Duration(d) => {
            out.extend_from_slice(&d.secs.to_le_bytes());
            out.extend_from_slice(&d.nsecs.to_le_bytes());
        }
        Value::Array(_) | Value::Message(_) => return Err(wrong_type(path, p, value)),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

fn read_message(
    reader: &mut Reader<'_>,
    descriptor: &TypeDescriptor,
    prefix: &str,
) -> CodecResult<MessageInstance> {
    let mut instance = MessageInstance::new(descriptor.schema_id());
    for field in descriptor.fields() {
        let value = match &field.constant {
            Some(constant) => constant.clone(),
            None => read_field(reader, &field.kind, &join(prefix, &field.accessor))?,
        };
        instance.set(field.accessor.clone(), value);
    }
    Ok(instance)
}

fn read_field(reader: &mut Reader<'_>, kind: &FieldKind, path: &str) -> CodecResult<Value> {
    match kind {
        FieldKind::Primitive(p) => read_primitive(reader, *p, path),
        FieldKind::Message(d) => Ok(Value::Message(read_message(reader, d, path)?)),
        FieldKind::Array { element, fixed_len } => {
            let count = reader.read_u32()? as usize;
            if let Some(expected) = fixed_len {
                if count != *expected {
                    return Err(CodecError::Validation(ValidationError::ArrayLength {
                        field: path.to_string(),
                        expected: *expected,
                        found: count,
                    }));
                }
            }

            let min_element = match element {
                ElementKind::Primitive(p) => p.min_size(),
                ElementKind::Message(d) => min_message_size(d),
            };
            if count.saturating_mul(min_element.max(1)) > reader.remaining() {
                return Err(CodecError::CountTooLarge {
                    field: path.to_string(),
                    count,
                    remaining: reader.remaining(),
                });
            }

            let mut items = Vec::with_capacity(count);
            for i in 0..count {
                let item_path = format!("{path}[{i}]");
                let item = match element {
                    ElementKind::Primitive(p) => read_primitive(reader, *p, &item_path)?,
                    ElementKind::Message(d) => Value::Message(read_message(reader, d, &item_path)?),
                };
                items.push(item);
            }
            Ok(Value::Array(items))
        }
    }
}

fn read_primitive(reader: &mut Reader<'_>, p: PrimitiveType, path: &str) -> CodecResult<Value> {
    Ok(match p {
        PrimitiveType::Bool => match reader.array::<1>()?[0] {
            0 => Value::Bool(false),
            1 => Value::Bool(true),
            value => {
                return Err(CodecError::InvalidBool {
                    field: path.to_string(),
                    value,
                });
            }
        },
        PrimitiveType::Int8 => Value::Int8(i8::from_le_bytes(reader.array()?)),
        PrimitiveType::UInt8 => Value::UInt8(u8::from_le_bytes(reader.array()?)),
        PrimitiveType::Int16 => Value::Int16(i16::from_le_bytes(reader.array()?)),
        PrimitiveType::UInt16 => Value::UInt16(u16::from_le_bytes(reader.array()?)),
        PrimitiveType::Int32 => Value::Int32(i32::from_le_bytes(reader.array()?)),
        PrimitiveType::UInt32 => Value::UInt32(u32::from_le_bytes(reader.array()?)),
        PrimitiveType::Int64 => Value::Int64(i64::from_le_bytes(reader.array()?)),
        PrimitiveType::UInt64 => Value::UInt64(u64::from_le_bytes(reader.array()?)),
        PrimitiveType::Float32 => Value::Float32(f32::from_le_bytes(reader.array()?)),
        PrimitiveType::Float64 => Value::Float64(f64::from_le_bytes(reader.array()?)),
        PrimitiveType::String => {
            let len = reader.read_u32()? as usize;
            let bytes = reader.take(len)?;
            let text = std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8 {
                field: path.to_string(),
            })?;
            Value::String(text.to_string())
        }
        PrimitiveType::Time => Value::Time(Time {
            secs: u32::from_le_bytes(reader.array()?),
            nsecs: u32::from_le_bytes(reader.array()?),
        }),
        PrimitiveType::Duration => Value::Duration(Duration {
            secs: i32::from_le_bytes(reader.array()?),
            nsecs: i32::from_le_bytes(reader.array()?),
        }),
    })
}

fn min_message_size(descriptor: &TypeDescriptor) -> usize {
    descriptor
        .fields()
        .iter()
        .filter(|f| !f.is_constant())
        .map(|f| match &f.kind {
            FieldKind::Primitive(p) => p.min_size(),
            FieldKind::Array { .. } => 4,
            FieldKind::Message(d) => min_message_size(d),
        })
        .sum()
}
