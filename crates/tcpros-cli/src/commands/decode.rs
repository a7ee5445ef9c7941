//! `tcpros decode`: decode a captured chunk of a stream.

use std::path::Path;

use tcpros_core::{MessageLoader, TypeDescriptor};
use tcpros_protocol::{ConnectionHeader, decode_frame};

use crate::error::CliResult;

pub async fn run(loader: &MessageLoader, type_id: &str, file: &Path) -> CliResult<()> {
    let descriptor = loader.load(type_id).await?;
    let bytes = tokio::fs::read(file).await?;
    println!("{}", render(&bytes, &descriptor)?);
    Ok(())
}

/// Decodes `bytes` and renders the result as pretty JSON.
///
/// A chunk holding only a connection header renders the header fields
/// under a `"header"` key.
pub fn render(bytes: &[u8], descriptor: &TypeDescriptor) -> CliResult<String> {
    let json = match decode_frame(bytes, descriptor)? {
        Some(message) => message.to_json(),
        None => serde_json::json!({ "header": ConnectionHeader::decode(bytes)? }),
    };
    Ok(serde_json::to_string_pretty(&json)?)
}
