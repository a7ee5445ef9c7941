//! Runtime values carried by message instances.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Primitive field types understood by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    String,
    Time,
    Duration,
}

impl PrimitiveType {
    /// Looks up a primitive by its schema name.
    ///
    /// `byte` and `char` are the legacy aliases of `int8` and `uint8`.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => Self::Bool,
            "int8" | "byte" => Self::Int8,
            "uint8" | "char" => Self::UInt8,
            "int16" => Self::Int16,
            "uint16" => Self::UInt16,
            "int32" => Self::Int32,
            "uint32" => Self::UInt32,
            "int64" => Self::Int64,
            "uint64" => Self::UInt64,
            "float32" => Self::Float32,
            "float64" => Self::Float64,
            "string" => Self::String,
            "time" => Self::Time,
            "duration" => Self::Duration,
            _ => return None,
        })
    }

    /// Returns the canonical schema name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int8 => "int8",
            Self::UInt8 => "uint8",
            Self::Int16 => "int16",
            Self::UInt16 => "uint16",
            Self::Int32 => "int32",
            Self::UInt32 => "uint32",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::String => "string",
            Self::Time => "time",
            Self::Duration => "duration",
        }
    }

    /// Encoded width in bytes, or `None` for strings.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            Self::Bool | Self::Int8 | Self::UInt8 => Some(1),
            Self::Int16 | Self::UInt16 => Some(2),
            Self::Int32 | Self::UInt32 | Self::Float32 => Some(4),
            Self::Int64 | Self::UInt64 | Self::Float64 => Some(8),
            Self::Time | Self::Duration => Some(8),
            Self::String => None,
        }
    }

    /// Smallest number of bytes a value of this type can occupy.
    pub fn min_size(&self) -> usize {
        self.fixed_size().unwrap_or(4)
    }

    /// Zero value for this type.
    pub fn default_value(&self) -> Value {
        match self {
            Self::Bool => Value::Bool(false),
            Self::Int8 => Value::Int8(0),
            Self::UInt8 => Value::UInt8(0),
            Self::Int16 => Value::Int16(0),
            Self::UInt16 => Value::UInt16(0),
            Self::Int32 => Value::Int32(0),
            Self::UInt32 => Value::UInt32(0),
            Self::Int64 => Value::Int64(0),
            Self::UInt64 => Value::UInt64(0),
            Self::Float32 => Value::Float32(0.0),
            Self::Float64 => Value::Float64(0.0),
            Self::String => Value::String(String::new()),
            Self::Time => Value::Time(Time::default()),
            Self::Duration => Value::Duration(Duration::default()),
        }
    }

    /// Parses a constant literal. Time and duration have no literal form.
    pub fn parse_literal(&self, literal: &str) -> Option<Value> {
        Some(match self {
            Self::Bool => match literal {
                "true" | "True" | "1" => Value::Bool(true),
                "false" | "False" | "0" => Value::Bool(false),
                _ => return None,
            },
            Self::Int8 => Value::Int8(literal.parse().ok()?),
            Self::UInt8 => Value::UInt8(literal.parse().ok()?),
            Self::Int16 => Value::Int16(literal.parse().ok()?),
            Self::UInt16 => Value::UInt16(literal.parse().ok()?),
            Self::Int32 => Value::Int32(literal.parse().ok()?),
            Self::UInt32 => Value::UInt32(literal.parse().ok()?),
            Self::Int64 => Value::Int64(literal.parse().ok()?),
            Self::UInt64 => Value::UInt64(literal.parse().ok()?),
            Self::Float32 => Value::Float32(literal.parse().ok()?),
            Self::Float64 => Value::Float64(literal.parse().ok()?),
            Self::String => Value::String(literal.to_string()),
            Self::Time | Self::Duration => return None,
        })
    }

    fn is_integer(&self) -> bool {
        matches!(
            self,
            Self::Int8
                | Self::UInt8
                | Self::Int16
                | Self::UInt16
                | Self::Int32
                | Self::UInt32
                | Self::Int64
                | Self::UInt64
        )
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `time` value: seconds and nanoseconds since the epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Time {
    pub secs: u32,
    pub nsecs: u32,
}

/// A `duration` value: signed seconds and nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Duration {
    pub secs: i32,
    pub nsecs: i32,
}

/// A field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    String(String),
    Time(Time),
    Duration(Duration),
    Array(Vec<Value>),
    Message(MessageInstance),
}

impl Value {
    /// Short name of the value's variant, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int8(_) => "int8",
            Self::UInt8(_) => "uint8",
            Self::Int16(_) => "int16",
            Self::UInt16(_) => "uint16",
            Self::Int32(_) => "int32",
            Self::UInt32(_) => "uint32",
            Self::Int64(_) => "int64",
            Self::UInt64(_) => "uint64",
            Self::Float32(_) => "float32",
            Self::Float64(_) => "float64",
            Self::String(_) => "string",
            Self::Time(_) => "time",
            Self::Duration(_) => "duration",
            Self::Array(_) => "array",
            Self::Message(_) => "message",
        }
    }

    /// Returns the primitive type this value encodes as, if any.
    pub fn primitive_type(&self) -> Option<PrimitiveType> {
        PrimitiveType::from_name(self.kind_name())
    }

    fn as_i128(&self) -> Option<i128> {
        Some(match *self {
            Self::Int8(v) => v.into(),
            Self::UInt8(v) => v.into(),
            Self::Int16(v) => v.into(),
            Self::UInt16(v) => v.into(),
            Self::Int32(v) => v.into(),
            Self::UInt32(v) => v.into(),
            Self::Int64(v) => v.into(),
            Self::UInt64(v) => v.into(),
            _ => return None,
        })
    }

    fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Float32(v) => Some(v.into()),
            Self::Float64(v) => Some(v),
            _ => self.as_i128().map(|v| v as f64),
        }
    }

    /// Converts a numeric value into `target`, checking the target's range.
    ///
    /// Values that already have the target type are returned unchanged;
    /// non-numeric mismatches are reported as [`ValidationError::WrongType`].
    pub fn coerce(self, field: &str, target: PrimitiveType) -> Result<Value, ValidationError> {
        if self.primitive_type() == Some(target) {
            return Ok(self);
        }

        let wrong_type = || ValidationError::WrongType {
            field: field.to_string(),
            expected: target.as_str().to_string(),
            found: self.kind_name().to_string(),
        };

        if target.is_integer() {
            let n = self.as_i128().ok_or_else(wrong_type)?;
            return integer_value(field, target, n);
        }

        match target {
            PrimitiveType::Float32 => {
                let v = self.as_f64().ok_or_else(wrong_type)?;
                if v.is_finite() && v.abs() > f32::MAX as f64 {
                    return Err(out_of_range(field, target, v));
                }
                Ok(Value::Float32(v as f32))
            }
            PrimitiveType::Float64 => Ok(Value::Float64(self.as_f64().ok_or_else(wrong_type)?)),
            _ => Err(wrong_type()),
        }
    }
}

/// Builds an integer value of type `target`, failing when `n` does not fit.
pub(crate) fn integer_value(
    field: &str,
    target: PrimitiveType,
    n: i128,
) -> Result<Value, ValidationError> {
    let value = match target {
        PrimitiveType::Int8 => i8::try_from(n).ok().map(Value::Int8),
        PrimitiveType::UInt8 => u8::try_from(n).ok().map(Value::UInt8),
        PrimitiveType::Int16 => i16::try_from(n).ok().map(Value::Int16),
        PrimitiveType::UInt16 => u16::try_from(n).ok().map(Value::UInt16),
        PrimitiveType::Int32 => i32::try_from(n).ok().map(Value::Int32),
        PrimitiveType::UInt32 => u32::try_from(n).ok().map(Value::UInt32),
        PrimitiveType::Int64 => i64::try_from(n).ok().map(Value::Int64),
        PrimitiveType::UInt64 => u64::try_from(n).ok().map(Value::UInt64),
        PrimitiveType::Float32 => Some(Value::Float32(n as f32)),
        PrimitiveType::Float64 => Some(Value::Float64(n as f64)),
        _ => {
            return Err(ValidationError::WrongType {
                field: field.to_string(),
                expected: target.as_str().to_string(),
                found: "number".to_string(),
            });
        }
    };
    value.ok_or_else(|| out_of_range(field, target, n))
}

pub(crate) fn out_of_range(
    field: &str,
    target: PrimitiveType,
    value: impl fmt::Display,
) -> ValidationError {
    ValidationError::OutOfRange {
        field: field.to_string(),
        value: value.to_string(),
        type_name: target.as_str().to_string(),
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i8 => Int8,
    u8 => UInt8,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
    String => String,
    Time => Time,
    Duration => Duration,
    Vec<Value> => Array,
    MessageInstance => Message,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

/// A message value: one slot per field, keyed by accessor name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageInstance {
    schema_id: String,
    values: BTreeMap<String, Value>,
}

impl MessageInstance {
    /// Creates an empty instance of the given message type.
    pub fn new(schema_id: impl Into<String>) -> Self {
        Self {
            schema_id: schema_id.into(),
            values: BTreeMap::new(),
        }
    }

    /// Returns the message type id.
    pub fn schema_id(&self) -> &str {
        &self.schema_id
    }

    /// Returns the value stored under an accessor name.
    pub fn get(&self, accessor: &str) -> Option<&Value> {
        self.values.get(accessor)
    }

    /// Returns a mutable reference to a stored value.
    pub fn get_mut(&mut self, accessor: &str) -> Option<&mut Value> {
        self.values.get_mut(accessor)
    }

    /// Stores a value, returning the previous one.
    pub fn set(&mut self, accessor: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(accessor.into(), value.into())
    }

    /// Builder: store a value.
    #[must_use]
    pub fn with(mut self, accessor: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(accessor, value);
        self
    }

    /// Removes a value.
    pub fn remove(&mut self, accessor: &str) -> Option<Value> {
        self.values.remove(accessor)
    }

    /// Returns true if a value is stored under the accessor name.
    pub fn contains(&self, accessor: &str) -> bool {
        self.values.contains_key(accessor)
    }

    /// Iterates over the stored accessor names.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true when no value is stored.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
