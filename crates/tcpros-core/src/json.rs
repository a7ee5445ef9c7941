//! Conversion between message instances and JSON.
//!
//! JSON numbers are narrowed into the declared field type with a range check.
//! `time` and `duration` use `{"secs": .., "nsecs": ..}` objects.

use serde_json::{Map, Number, Value as Json};

use crate::descriptor::{ElementKind, FieldKind, TypeDescriptor};
use crate::error::ValidationError;
use crate::value::{Duration, MessageInstance, PrimitiveType, Time, Value, integer_value, out_of_range};

impl MessageInstance {
    /// Builds an instance of `descriptor` from a JSON object.
    ///
    /// Fields missing from the object keep their defaults. Unknown keys are
    /// rejected, as are constants set to anything but their literal.
    pub fn from_json(descriptor: &TypeDescriptor, json: &Json) -> Result<Self, ValidationError> {
        object_to_instance(descriptor, json, "")
    }

    /// Renders the instance as a JSON object.
    pub fn to_json(&self) -> Json {
        let map: Map<String, Json> = self
            .keys()
            .filter_map(|k| self.get(k).map(|v| (k.to_string(), value_to_json(v))))
            .collect();
        Json::Object(map)
    }
}

fn object_to_instance(
    descriptor: &TypeDescriptor,
    json: &Json,
    prefix: &str,
) -> Result<MessageInstance, ValidationError> {
    let Json::Object(map) = json else {
        return Err(ValidationError::InvalidMessage {
            schema_id: descriptor.schema_id().to_string(),
            reason: format!("expected a JSON object, found {}", json_kind(json)),
        });
    };

    let mut instance = descriptor.default_instance();
    for (key, raw) in map {
        let path = join(prefix, key);
        let field = descriptor
            .field(key)
            .ok_or_else(|| ValidationError::UnknownField {
                schema_id: descriptor.schema_id().to_string(),
                field: path.clone(),
            })?;

        let value = match (&field.constant, &field.kind) {
            (Some(constant), FieldKind::Primitive(p)) => {
                let value = primitive_from_json(*p, raw, &path)?;
                if value != *constant {
                    return Err(ValidationError::ConstantModified { field: path });
                }
                value
            }
            (_, kind) => field_from_json(kind, raw, &path)?,
        };
        instance.set(key.clone(), value);
    }
    Ok(instance)
}

fn field_from_json(kind: &FieldKind, json: &Json, path: &str) -> Result<Value, ValidationError> {
    match kind {
        FieldKind::Primitive(p) => primitive_from_json(*p, json, path),
        FieldKind::Message(d) => object_to_instance(d, json, path).map(Value::Message),
        FieldKind::Array { element, fixed_len } => {
            let Json::Array(items) = json else {
                return Err(wrong_type(path, kind.to_string(), json));
            };
            if let Some(expected) = fixed_len {
                if items.len() != *expected {
                    return Err(ValidationError::ArrayLength {
                        field: path.to_string(),
                        expected: *expected,
                        found: items.len(),
                    });
                }
            }
            items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let path = format!("{path}[{i}]");
                    match element {
                        ElementKind::Primitive(p) => primitive_from_json(*p, item, &path),
                        ElementKind::Message(d) => {
                            object_to_instance(d, item, &path).map(Value::Message)
                        }
                    }
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
    }
}

fn primitive_from_json(target: PrimitiveType, json: &Json, path: &str) -> Result<Value, ValidationError> {
    let mismatch = || wrong_type(path, target.to_string(), json);
    match (target, json) {
        (PrimitiveType::Bool, Json::Bool(b)) => Ok(Value::Bool(*b)),
        (PrimitiveType::String, Json::String(s)) => Ok(Value::String(s.clone())),
        (PrimitiveType::Float32, Json::Number(n)) => {
            let v = n.as_f64().ok_or_else(mismatch)?;
            if v.abs() > f32::MAX as f64 {
                return Err(out_of_range(path, target, v));
            }
            Ok(Value::Float32(v as f32))
        }
        (PrimitiveType::Float64, Json::Number(n)) => n.as_f64().map(Value::Float64).ok_or_else(mismatch),
        (PrimitiveType::Time, Json::Object(_)) => {
            let (secs, nsecs) = stamp_parts(json, path)?;
            Ok(Value::Time(Time {
                secs: stamp_field(target, secs, path)?,
                nsecs: stamp_field(target, nsecs, path)?,
            }))
        }
        (PrimitiveType::Duration, Json::Object(_)) => {
            let (secs, nsecs) = stamp_parts(json, path)?;
            Ok(Value::Duration(Duration {
                secs: stamp_field(target, secs, path)?,
                nsecs: stamp_field(target, nsecs, path)?,
            }))
        }
        (_, Json::Number(n)) => match json_integer(n) {
            Some(i) => integer_value(path, target, i),
            None if n.as_f64().is_some_and(|f| f.fract() != 0.0) => {
                Err(out_of_range(path, target, n))
            }
            None => Err(mismatch()),
        },
        _ => Err(mismatch()),
    }
}

fn json_integer(n: &Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}

fn stamp_parts(json: &Json, path: &str) -> Result<(i128, i128), ValidationError> {
    let part = |name: &str| {
        let field = format!("{path}.{name}");
        match json.get(name) {
            None => Ok(0),
            Some(Json::Number(n)) => json_integer(n).ok_or_else(|| out_of_range(&field, PrimitiveType::Int64, n)),
            Some(other) => Err(wrong_type(&field, "integer".to_string(), other)),
        }
    };
    Ok((part("secs")?, part("nsecs")?))
}

fn stamp_field<T: TryFrom<i128>>(target: PrimitiveType, n: i128, path: &str) -> Result<T, ValidationError> {
    T::try_from(n).map_err(|_| out_of_range(path, target, n))
}

fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Bool(v) => Json::Bool(*v),
        Value::Int8(v) => (*v).into(),
        Value::UInt8(v) => (*v).into(),
        Value::Int16(v) => (*v).into(),
        Value::UInt16(v) => (*v).into(),
        Value::Int32(v) => (*v).into(),
        Value::UInt32(v) => (*v).into(),
        Value::Int64(v) => (*v).into(),
        Value::UInt64(v) => (*v).into(),
        Value::Float32(v) => float(f64::from(*v)),
        Value::Float64(v) => float(*v),
        Value::String(v) => Json::String(v.clone()),
        Value::Time(t) => serde_json::to_value(t).unwrap_or(Json::Null),
        Value::Duration(d) => serde_json::to_value(d).unwrap_or(Json::Null),
        Value::Array(items) => Json::Array(items.iter().map(value_to_json).collect()),
        Value::Message(m) => m.to_json(),
    }
}

// JSON has no NaN or infinity.
fn float(v: f64) -> Json {
    Number::from_f64(v).map_or(Json::Null, Json::Number)
}

fn wrong_type(path: &str, expected: String, found: &Json) -> ValidationError {
    ValidationError::WrongType {
        field: path.to_string(),
        expected,
        found: json_kind(found).to_string(),
    }
}

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}
