//! Core value types shared by the cache, the pipeline and the consumer runtime

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Registry-assigned identifier of one schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SchemaId(pub u32);

impl SchemaId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SchemaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SchemaId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Immutable schema text as returned by the registry
///
/// Cloning shares the underlying buffer, so handing a definition to every
/// worker that resolves the same id costs a reference-count bump.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SchemaDefinition(Arc<str>);

impl SchemaDefinition {
    pub fn new(schema: impl Into<Arc<str>>) -> Self {
        Self(schema.into())
    }

    /// The raw schema text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SchemaDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SchemaDefinition").field(&&*self.0).finish()
    }
}

impl std::fmt::Display for SchemaDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SchemaDefinition {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SchemaDefinition {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for SchemaDefinition {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A message as delivered by the log transport, before decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Bytes>,
    /// Confluent-framed payload: magic byte, 4-byte schema id, Avro body
    pub payload: Bytes,
}

impl RawMessage {
    pub fn new(
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key: None,
            payload: payload.into(),
        }
    }

    /// Attach a message key
    pub fn with_key(mut self, key: impl Into<Bytes>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// A decoded message, handed once to the delivery callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedMessage {
    pub schema_id: SchemaId,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    /// Message key read as UTF-8 text (empty when the record had no key)
    pub key: String,
    /// Avro JSON text of the decoded record
    pub value: String,
}

impl DecodedMessage {
    /// Parse the textual value back into a JSON document
    pub fn value_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.value)
    }
}
