//! Message schema parsing.
//!
//! A schema is plain text with one field per line:
//!
//! ```text
//! # comment
//! int32 count
//! string label
//! uint8 MODE_AUTO=1
//! string GREETING=hello # still part of the constant
//! ```
//!
//! A `#` starts a comment that runs to the end of the line, except on lines
//! where an `=` comes before the first `#`: there the whole remainder is kept,
//! so string constants may contain `#`.

use crate::error::{SchemaError, SchemaResult};

/// A single field as written in the schema text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Raw field name.
    pub name: String,
    /// Declared type, e.g. `int32`, `string[]`, `geometry_msgs/Point`.
    pub type_name: String,
    /// Constant literal, for `TYPE NAME=VALUE` lines.
    pub constant_value: Option<String>,
    /// 1-based position in the schema.
    pub ordinal: u32,
}

impl FieldDescriptor {
    /// Returns true for constant fields.
    pub fn is_constant(&self) -> bool {
        self.constant_value.is_some()
    }
}

/// Parses schema text into its ordered list of fields.
pub fn parse(text: &str) -> SchemaResult<Vec<FieldDescriptor>> {
    let mut fields = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line = strip_comment(raw.trim()).trim();
        if line.is_empty() {
            continue;
        }

        let Some((type_name, rest)) = line.split_once(|c: char| c.is_ascii_whitespace()) else {
            return Err(SchemaError::parse(index + 1, line, "missing field name"));
        };

        let (name, constant_value) = match rest.split_once('=') {
            Some((name, value)) => (name.trim(), Some(value.trim().to_string())),
            None => (rest.trim(), None),
        };

        if name.is_empty() {
            return Err(SchemaError::parse(index + 1, line, "missing field name"));
        }

        fields.push(FieldDescriptor {
            name: name.to_string(),
            type_name: type_name.to_string(),
            constant_value,
            ordinal: fields.len() as u32 + 1,
        });
    }

    Ok(fields)
}

fn strip_comment(line: &str) -> &str {
    match (line.find('='), line.find('#')) {
        (Some(equal), Some(hash)) if equal < hash => line,
        (_, Some(hash)) => &line[..hash],
        _ => line,
    }
}

/// Computes the digest of raw schema text (lowercase hex MD5).
pub fn digest(text: &str) -> String {
    format!("{:x}", md5::compute(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fields_in_order() {
        let fields = parse("int32 a\nstring b\n").unwrap();
        assert_eq!(
            fields,
            vec![
                FieldDescriptor {
                    name: "a".into(),
                    type_name: "int32".into(),
                    constant_value: None,
                    ordinal: 1,
                },
                FieldDescriptor {
                    name: "b".into(),
                    type_name: "string".into(),
                    constant_value: None,
                    ordinal: 2,
                },
            ]
        );
    }

    #[test]
    fn skips_blank_and_comment_lines() {
        let text = "\n# header comment\n   \nfloat64 x  # trailing\n\t# indented\nfloat64 y\n";
        let fields = parse(text).unwrap();
        let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["x", "y"]);
        assert_eq!(fields[1].ordinal, 2);
    }

    #[test]
    fn constants_are_split_on_first_equal() {
        let fields = parse("int32 ANSWER = 42\nstring EQ=a=b").unwrap();
        assert_eq!(fields[0].name, "ANSWER");
        assert_eq!(fields[0].constant_value.as_deref(), Some("42"));
        assert_eq!(fields[1].name, "EQ");
        assert_eq!(fields[1].constant_value.as_deref(), Some("a=b"));
        assert!(fields[1].is_constant());
    }

    #[test]
    fn hash_after_equal_is_kept_in_constant() {
        let fields = parse("string COLOR=#ff0000").unwrap();
        assert_eq!(fields[0].constant_value.as_deref(), Some("#ff0000"));
    }

    #[test]
    fn hash_before_equal_is_a_comment() {
        let fields = parse("int32 a # note: x=1").unwrap();
        assert_eq!(fields[0].name, "a");
        assert!(fields[0].constant_value.is_none());
    }

    #[test]
    fn missing_separator_is_a_parse_error() {
        let err = parse("int32 a\nbogus\n").unwrap_err();
        match err {
            SchemaError::Parse { line, content, .. } => {
                assert_eq!(line, 2);
                assert_eq!(content, "bogus");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_constant_name_is_a_parse_error() {
        assert!(matches!(
            parse("int32 =5"),
            Err(SchemaError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn digest_is_deterministic_and_text_sensitive() {
        let text = "int32 a\nstring b\n";
        assert_eq!(digest(text), digest(text));
        assert_eq!(digest(text).len(), 32);
        assert_ne!(digest(text), digest("int32 a\nstring b"));
        assert_ne!(digest(text), digest("int32 a\nstring b\n# c\n"));
        assert_ne!(digest(text), digest("int32  a\nstring b\n"));
    }

    #[test]
    fn digest_matches_md5() {
        assert_eq!(digest("hello"), "5d41402abc4b2a76b9719d911017c592");
    }
}
