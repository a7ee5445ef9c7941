//! Compiled message types.
//!
//! A [`TypeDescriptor`] is pure data: the ordered field list of a schema with
//! every field's kind resolved (primitive, array or nested message). The
//! codec and validator walk this list; nothing is generated per type.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::error::{SchemaError, SchemaResult, ValidationError};
use crate::schema::{self, FieldDescriptor};
use crate::value::{MessageInstance, PrimitiveType, Value};

/// Package assumed for the bare `Header` type.
const HEADER_TYPE: &str = "std_msgs/Header";

/// Element type of an array field.
#[derive(Debug, Clone)]
pub enum ElementKind {
    Primitive(PrimitiveType),
    Message(Arc<TypeDescriptor>),
}

impl ElementKind {
    /// Zero value for one element.
    pub fn default_value(&self) -> Value {
        match self {
            Self::Primitive(p) => p.default_value(),
            Self::Message(d) => Value::Message(d.default_instance()),
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(p) => write!(f, "{p}"),
            Self::Message(d) => f.write_str(d.schema_id()),
        }
    }
}

/// Resolved kind of a field.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Primitive(PrimitiveType),
    Array {
        element: ElementKind,
        fixed_len: Option<usize>,
    },
    Message(Arc<TypeDescriptor>),
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(p) => write!(f, "{p}"),
            Self::Array {
                element,
                fixed_len: Some(n),
            } => write!(f, "{element}[{n}]"),
            Self::Array { element, .. } => write!(f, "{element}[]"),
            Self::Message(d) => f.write_str(d.schema_id()),
        }
    }
}

/// A field of a compiled type.
#[derive(Debug, Clone)]
pub struct Field {
    /// The field as parsed from the schema.
    pub descriptor: FieldDescriptor,
    /// Name used to read and write the field on an instance.
    pub accessor: String,
    /// Resolved kind.
    pub kind: FieldKind,
    /// Parsed literal for constant fields.
    pub constant: Option<Value>,
}

impl Field {
    /// Returns true for constant fields.
    pub fn is_constant(&self) -> bool {
        self.constant.is_some()
    }

    /// Zero value for the field (the literal, for constants).
    pub fn default_value(&self) -> Value {
        if let Some(constant) = &self.constant {
            return constant.clone();
        }
        match &self.kind {
            FieldKind::Primitive(p) => p.default_value(),
            FieldKind::Array {
                element,
                fixed_len: Some(n),
            } => Value::Array((0..*n).map(|_| element.default_value()).collect()),
            FieldKind::Array { .. } => Value::Array(Vec::new()),
            FieldKind::Message(d) => Value::Message(d.default_instance()),
        }
    }
}

/// A compiled message type.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    schema_id: String,
    package: Option<String>,
    name: String,
    digest: String,
    definition: String,
    fields: Vec<Field>,
    accessor_names: Vec<String>,
}

impl TypeDescriptor {
    /// Compiles parsed fields into a type.
    ///
    /// Nested message types are resolved through `lookup`, which receives
    /// fully qualified ids (see [`resolve_type_id`]).
    pub fn compile<F>(
        schema_id: &str,
        fields: Vec<FieldDescriptor>,
        digest: impl Into<String>,
        lookup: F,
    ) -> SchemaResult<Self>
    where
        F: Fn(&str) -> Option<Arc<TypeDescriptor>>,
    {
        let (package, name) = split_message_id(schema_id)?;
        let mut seen = HashSet::new();
        let mut compiled = Vec::with_capacity(fields.len());

        for descriptor in fields {
            let kind = resolve_kind(&descriptor, package, &lookup)?;
            let accessor = accessor_name(&descriptor);

            if !seen.insert(accessor.clone()) {
                return Err(SchemaError::DuplicateField {
                    schema_id: schema_id.to_string(),
                    accessor,
                });
            }

            let constant = match &descriptor.constant_value {
                Some(literal) => Some(parse_constant(&descriptor, &kind, literal)?),
                None => None,
            };

            compiled.push(Field {
                descriptor,
                accessor,
                kind,
                constant,
            });
        }

        let accessor_names = compiled.iter().map(|f| f.accessor.clone()).collect();

        Ok(Self {
            schema_id: schema_id.to_string(),
            package: package.map(str::to_string),
            name: name.to_string(),
            digest: digest.into(),
            definition: String::new(),
            fields: compiled,
            accessor_names,
        })
    }

    /// Parses and compiles schema text, using its MD5 as the digest.
    pub fn from_text<F>(schema_id: &str, text: &str, lookup: F) -> SchemaResult<Self>
    where
        F: Fn(&str) -> Option<Arc<TypeDescriptor>>,
    {
        let fields = schema::parse(text)?;
        Ok(Self::compile(schema_id, fields, schema::digest(text), lookup)?.with_definition(text))
    }

    /// Builder: attach the raw schema text.
    #[must_use]
    pub fn with_definition(mut self, text: impl Into<String>) -> Self {
        self.definition = text.into();
        self
    }

    /// Returns the message id (`package/Name` or `Name`).
    pub fn schema_id(&self) -> &str {
        &self.schema_id
    }

    /// Returns the package part of the id.
    pub fn package(&self) -> Option<&str> {
        self.package.as_deref()
    }

    /// Returns the message name part of the id.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the digest of the schema text.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Returns the raw schema text, empty if compiled from bare fields.
    pub fn definition(&self) -> &str {
        &self.definition
    }

    /// Returns the fields in schema order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Returns the accessor names in schema order.
    pub fn accessor_names(&self) -> &[String] {
        &self.accessor_names
    }

    /// Looks up a field by accessor name.
    pub fn field(&self, accessor: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.accessor == accessor)
    }

    /// Name of the validator, kept for diagnostics (`validatePoint`).
    pub fn validator_name(&self) -> String {
        format!("validate{}", camel_case(&self.name, false))
    }

    /// Creates an instance with every field at its default.
    pub fn default_instance(&self) -> MessageInstance {
        let mut instance = MessageInstance::new(&self.schema_id);
        for field in &self.fields {
            instance.set(field.accessor.clone(), field.default_value());
        }
        instance
    }

    /// Creates a default instance and applies `overrides` on top of it.
    ///
    /// Primitive overrides are converted to the declared type with a range
    /// check. Overriding a constant with anything but its literal fails.
    /// Keys unknown to the type are kept, so strict validation can catch them.
    pub fn instance_with<I, K, V>(&self, overrides: I) -> Result<MessageInstance, ValidationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut instance = self.default_instance();
        for (key, value) in overrides {
            let key = key.into();
            let value = value.into();
            let Some(field) = self.field(&key) else {
                instance.set(key, value);
                continue;
            };
            let value = match field.kind {
                FieldKind::Primitive(p) => value.coerce(&key, p)?,
                _ => value,
            };
            if field.constant.as_ref().is_some_and(|c| *c != value) {
                return Err(ValidationError::ConstantModified { field: key });
            }
            instance.set(key, value);
        }
        Ok(instance)
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.schema_id == other.schema_id && self.digest == other.digest
    }
}

/// Splits a message id into its optional package and name.
pub fn split_message_id(id: &str) -> SchemaResult<(Option<&str>, &str)> {
    let invalid = || SchemaError::InvalidMessageId(id.to_string());
    match id.split_once('/') {
        Some((package, name)) => {
            if package.is_empty() || name.is_empty() || name.contains('/') {
                return Err(invalid());
            }
            Ok((Some(package), name))
        }
        None if id.is_empty() => Err(invalid()),
        None => Ok((None, id)),
    }
}

/// Qualifies a nested type name relative to the enclosing package.
///
/// Qualified names are returned as is, `Header` maps to `std_msgs/Header`
/// and other bare names are looked up in the enclosing package.
pub fn resolve_type_id(base: &str, package: Option<&str>) -> String {
    if base.contains('/') {
        return base.to_string();
    }
    if base == "Header" {
        return HEADER_TYPE.to_string();
    }
    match package {
        Some(package) => format!("{package}/{base}"),
        None => base.to_string(),
    }
}

/// Returns the ids of the message types a field list refers to.
pub fn nested_type_ids(fields: &[FieldDescriptor], package: Option<&str>) -> Vec<String> {
    let mut ids = Vec::new();
    for field in fields {
        let Ok((base, _)) = split_array(&field.type_name) else {
            continue;
        };
        if PrimitiveType::from_name(base).is_some() {
            continue;
        }
        let id = resolve_type_id(base, package);
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

/// Splits `T[]` / `T[N]` into the element type and optional array length.
///
/// The outer `Option` is `Some` for arrays; the inner one holds the fixed length.
fn split_array(type_name: &str) -> Result<(&str, Option<Option<usize>>), ()> {
    let Some(open) = type_name.find('[') else {
        return Ok((type_name, None));
    };
    let Some(inner) = type_name[open + 1..].strip_suffix(']') else {
        return Err(());
    };
    let base = &type_name[..open];
    if inner.is_empty() {
        return Ok((base, Some(None)));
    }
    inner
        .parse::<usize>()
        .map(|n| (base, Some(Some(n))))
        .map_err(|_| ())
}

fn resolve_kind<F>(
    field: &FieldDescriptor,
    package: Option<&str>,
    lookup: &F,
) -> SchemaResult<FieldKind>
where
    F: Fn(&str) -> Option<Arc<TypeDescriptor>>,
{
    let unresolved = || SchemaError::UnresolvedType {
        field: field.name.clone(),
        type_name: field.type_name.clone(),
    };

    let (base, array) = split_array(&field.type_name).map_err(|_| unresolved())?;
    if base.is_empty() {
        return Err(unresolved());
    }

    let element = match PrimitiveType::from_name(base) {
        Some(p) => ElementKind::Primitive(p),
        None => ElementKind::Message(
            lookup(&resolve_type_id(base, package)).ok_or_else(unresolved)?,
        ),
    };

    Ok(match (array, element) {
        (Some(fixed_len), element) => FieldKind::Array { element, fixed_len },
        (None, ElementKind::Primitive(p)) => FieldKind::Primitive(p),
        (None, ElementKind::Message(d)) => FieldKind::Message(d),
    })
}

fn parse_constant(field: &FieldDescriptor, kind: &FieldKind, literal: &str) -> SchemaResult<Value> {
    let parsed = match kind {
        FieldKind::Primitive(p) => p.parse_literal(literal),
        _ => None,
    };
    parsed.ok_or_else(|| SchemaError::InvalidConstant {
        field: field.name.clone(),
        type_name: field.type_name.clone(),
        literal: literal.to_string(),
    })
}

fn accessor_name(field: &FieldDescriptor) -> String {
    if field.is_constant() {
        field.name.clone()
    } else {
        camel_case(&field.name, true)
    }
}

/// Joins `snake_case` words as `CamelCase`, optionally lowering the first letter.
pub fn camel_case(word: &str, lower_first: bool) -> String {
    let mut out = String::with_capacity(word.len());
    for part in word.split('_').filter(|p| !p.is_empty()) {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }

    if lower_first {
        let mut chars = out.chars();
        if let Some(first) = chars.next() {
            return first.to_lowercase().chain(chars).collect();
        }
    }
    out
}
