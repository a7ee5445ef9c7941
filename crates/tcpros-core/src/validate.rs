//! Instance validation against a compiled type.

use crate::descriptor::{ElementKind, FieldKind, TypeDescriptor};
use crate::error::ValidationError;
use crate::value::{MessageInstance, Value};

impl TypeDescriptor {
    /// Checks an instance against this type.
    ///
    /// With `strict`, every key on the instance must be a known accessor.
    /// Missing fields are allowed (partial instances are valid); present
    /// values must match their declared kind, fixed arrays their length and
    /// constants their literal.
    pub fn validate(&self, instance: &MessageInstance, strict: bool) -> Result<(), ValidationError> {
        self.validate_at(instance, strict, "")
    }

    fn validate_at(
        &self,
        instance: &MessageInstance,
        strict: bool,
        prefix: &str,
    ) -> Result<(), ValidationError> {
        if !instance.schema_id().is_empty() && instance.schema_id() != self.schema_id() {
            return Err(ValidationError::InvalidMessage {
                schema_id: self.schema_id().to_string(),
                reason: format!("instance is a {}", instance.schema_id()),
            });
        }

        if strict {
            if let Some(unknown) = instance.keys().find(|k| self.field(k).is_none()) {
                return Err(ValidationError::UnknownField {
                    schema_id: self.schema_id().to_string(),
                    field: join(prefix, unknown),
                });
            }
        }

        for field in self.fields() {
            let Some(value) = instance.get(&field.accessor) else {
                continue;
            };
            let path = join(prefix, &field.accessor);

            if let Some(constant) = &field.constant {
                if value != constant {
                    return Err(ValidationError::ConstantModified { field: path });
                }
                continue;
            }

            check_field(&field.kind, value, strict, &path)?;
        }

        Ok(())
    }
}

fn check_field(kind: &FieldKind, value: &Value, strict: bool, path: &str) -> Result<(), ValidationError> {
    match (kind, value) {
        (FieldKind::Primitive(p), v) if v.primitive_type() == Some(*p) => Ok(()),
        (FieldKind::Array { element, fixed_len }, Value::Array(items)) => {
            if let Some(expected) = fixed_len {
                if items.len() != *expected {
                    return Err(ValidationError::ArrayLength {
                        field: path.to_string(),
                        expected: *expected,
                        found: items.len(),
                    });
                }
            }
            for (i, item) in items.iter().enumerate() {
                check_element(element, item, strict, &format!("{path}[{i}]"))?;
            }
            Ok(())
        }
        (FieldKind::Message(d), Value::Message(inner)) => d.validate_at(inner, strict, path),
        (kind, value) => Err(wrong_type(path, kind.to_string(), value)),
    }
}

fn check_element(
    element: &ElementKind,
    value: &Value,
    strict: bool,
    path: &str,
) -> Result<(), ValidationError> {
    match (element, value) {
        (ElementKind::Primitive(p), v) if v.primitive_type() == Some(*p) => Ok(()),
        (ElementKind::Message(d), Value::Message(inner)) => d.validate_at(inner, strict, path),
        (element, value) => Err(wrong_type(path, element.to_string(), value)),
    }
}

fn wrong_type(path: &str, expected: String, found: &Value) -> ValidationError {
    ValidationError::WrongType {
        field: path.to_string(),
        expected,
        found: found.kind_name().to_string(),
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}
