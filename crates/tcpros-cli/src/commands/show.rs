//! `tcpros show`: describe a message type.

use std::fmt::Write;

use tcpros_core::{MessageLoader, TypeDescriptor};

use crate::error::CliResult;

pub async fn run(loader: &MessageLoader, type_id: &str) -> CliResult<()> {
    let descriptor = loader.load(type_id).await?;
    print!("{}", render(&descriptor));
    Ok(())
}

/// Renders the digest and field list of a type.
///
/// Fields whose accessor differs from their schema name get `-> accessor`.
pub fn render(descriptor: &TypeDescriptor) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "type:      {}", descriptor.schema_id());
    let _ = writeln!(out, "md5sum:    {}", descriptor.digest());
    let _ = writeln!(out, "validator: {}", descriptor.validator_name());
    let _ = writeln!(out, "fields:");

    for field in descriptor.fields() {
        let name = &field.descriptor.name;
        let _ = write!(out, "  {} {name}", field.kind);
        if let Some(literal) = &field.descriptor.constant_value {
            let _ = write!(out, " = {literal}");
        }
        if field.accessor != *name {
            let _ = write!(out, " -> {}", field.accessor);
        }
        out.push('\n');
    }
    out
}
