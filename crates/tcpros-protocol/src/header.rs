//! The key=value handshake blob exchanged when a session opens.
//!
//! ```text
//! +----------------+-------------------+--------------+-------------------+----
//! | total (4 LE)   | entry len (4 LE)  | key=value    | entry len (4 LE)  | ...
//! +----------------+-------------------+--------------+-------------------+----
//! ```

use serde::{Deserialize, Serialize};
use tcpros_core::{Reader, TypeDescriptor};

use crate::error::{ProtocolError, ProtocolResult};

/// Digest value that matches any type.
pub const WILDCARD_DIGEST: &str = "*";

const CALLER_ID: &str = "callerid";
const TOPIC: &str = "topic";
const TYPE: &str = "type";
const MD5SUM: &str = "md5sum";
const MESSAGE_DEFINITION: &str = "message_definition";
const LATCHING: &str = "latching";

/// Handshake metadata. Unset keys are left off the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionHeader {
    #[serde(rename = "callerid", skip_serializing_if = "Option::is_none")]
    pub caller_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md5sum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_definition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latching: Option<i64>,
}

impl ConnectionHeader {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_caller_id(mut self, caller_id: impl Into<String>) -> Self {
        self.caller_id = Some(caller_id.into());
        self
    }

    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    #[must_use]
    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    #[must_use]
    pub fn with_md5sum(mut self, md5sum: impl Into<String>) -> Self {
        self.md5sum = Some(md5sum.into());
        self
    }

    #[must_use]
    pub fn with_message_definition(mut self, definition: impl Into<String>) -> Self {
        self.message_definition = Some(definition.into());
        self
    }

    #[must_use]
    pub fn with_latching(mut self, latching: bool) -> Self {
        self.latching = Some(i64::from(latching));
        self
    }

    /// Builder: fill `type` and `md5sum` from a compiled type.
    #[must_use]
    pub fn with_descriptor(self, descriptor: &TypeDescriptor) -> Self {
        self.with_type(descriptor.schema_id())
            .with_md5sum(descriptor.digest())
    }

    /// Returns true when the peer announced a latched topic.
    pub fn is_latching(&self) -> bool {
        self.latching.is_some_and(|v| v != 0)
    }

    /// Checks the announced digest against `expected`.
    ///
    /// `*` on either side matches anything; a missing digest matches nothing.
    pub fn check_digest(&self, expected: &str) -> bool {
        match self.md5sum.as_deref() {
            Some(WILDCARD_DIGEST) => true,
            Some(_) if expected == WILDCARD_DIGEST => true,
            Some(md5sum) => md5sum == expected,
            None => false,
        }
    }

    fn entries(&self) -> Vec<(&'static str, String)> {
        let latching = self.latching.map(|v| v.to_string());
        [
            (CALLER_ID, self.caller_id.clone()),
            (TOPIC, self.topic.clone()),
            (TYPE, self.type_name.clone()),
            (MD5SUM, self.md5sum.clone()),
            (MESSAGE_DEFINITION, self.message_definition.clone()),
            (LATCHING, latching),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key, v)))
        .collect()
    }

    /// Encodes the header as a complete frame, total length first.
    ///
    /// `callerid`, `topic`, `type` and `md5sum` come first, in that order.
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        for (key, value) in self.entries() {
            let entry_len = key.len() + 1 + value.len();
            body.extend_from_slice(&(entry_len as u32).to_le_bytes());
            body.extend_from_slice(key.as_bytes());
            body.push(b'=');
            body.extend_from_slice(value.as_bytes());
        }

        let mut frame = Vec::with_capacity(4 + body.len());
        frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
        frame.extend_from_slice(&body);
        frame
    }

    /// Decodes a complete header frame.
    pub fn decode(frame: &[u8]) -> ProtocolResult<Self> {
        let mut reader = Reader::new(frame);
        let total = reader.read_u32().map_err(ProtocolError::malformed)? as usize;
        if total != reader.remaining() {
            return Err(ProtocolError::malformed(format!(
                "length prefix says {total} bytes, frame holds {}",
                reader.remaining()
            )));
        }
        Self::decode_fields(reader.take(total).map_err(ProtocolError::malformed)?)
    }

    /// Decodes the entries of a header whose total length was already read.
    ///
    /// Unknown keys and entries without `=` are skipped.
    pub fn decode_fields(body: &[u8]) -> ProtocolResult<Self> {
        let mut header = Self::default();
        let mut reader = Reader::new(body);

        while reader.remaining() > 0 {
            let len = reader.read_u32().map_err(ProtocolError::malformed)? as usize;
            let entry = reader.take(len).map_err(ProtocolError::malformed)?;
            let entry = std::str::from_utf8(entry)
                .map_err(|_| ProtocolError::malformed("entry is not valid UTF-8"))?;
            let Some((key, value)) = entry.split_once('=') else {
                continue;
            };

            let value = value.to_string();
            match key {
                CALLER_ID => header.caller_id = Some(value),
                TOPIC => header.topic = Some(value),
                TYPE => header.type_name = Some(value),
                MD5SUM => header.md5sum = Some(value),
                MESSAGE_DEFINITION => header.message_definition = Some(value),
                LATCHING => {
                    let flag = value.trim().parse().map_err(|_| ProtocolError::InvalidHeaderValue {
                        key: key.to_string(),
                        value: value.clone(),
                    })?;
                    header.latching = Some(flag);
                }
                _ => {}
            }
        }

        Ok(header)
    }
}
