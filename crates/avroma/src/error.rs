//! Error types for avroma
//!
//! Errors are split by blast radius:
//! - [`DecodeError`] covers one message. All variants except
//!   [`DecodeError::RegistryFetch`] only cost the current message.
//! - [`ConsumerError`] ends the consumer run.

use crate::avro::AvroError;
use crate::types::SchemaId;
use serde::Serialize;
use thiserror::Error;

/// Confluent-compatible registry error codes
pub mod error_codes {
    pub const SUBJECT_NOT_FOUND: u32 = 40401;
    pub const VERSION_NOT_FOUND: u32 = 40402;
    pub const SCHEMA_NOT_FOUND: u32 = 40403;
}

/// Errors from the schema registry collaborator
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Schema not found: {0}")]
    SchemaNotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid registry response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RegistryError {
    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, RegistryError::Network(_))
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RegistryError::InvalidResponse(err.to_string())
        } else {
            RegistryError::Network(err.to_string())
        }
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Category of a decode failure, used for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InputFormat,
    RegistryFetch,
    CodecConstruction,
    Decode,
    Encode,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::InputFormat => "input_format",
            ErrorKind::RegistryFetch => "registry_fetch",
            ErrorKind::CodecConstruction => "codec_construction",
            ErrorKind::Decode => "decode",
            ErrorKind::Encode => "encode",
        };
        f.write_str(name)
    }
}

/// Failure of one run of the decode pipeline
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Message too short for Confluent framing: {len} bytes, need at least 5")]
    InputFormat { len: usize },

    #[error("Failed to fetch schema {schema_id} from registry: {source}")]
    RegistryFetch {
        schema_id: SchemaId,
        #[source]
        source: RegistryError,
    },

    #[error("Failed to build codec for schema {schema_id}: {source}")]
    CodecConstruction {
        schema_id: SchemaId,
        #[source]
        source: AvroError,
    },

    #[error("Failed to decode payload with schema {schema_id}: {source}")]
    Decode {
        schema_id: SchemaId,
        #[source]
        source: AvroError,
    },

    #[error("Failed to encode record with schema {schema_id} as text: {source}")]
    Encode {
        schema_id: SchemaId,
        #[source]
        source: AvroError,
    },
}

impl DecodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DecodeError::InputFormat { .. } => ErrorKind::InputFormat,
            DecodeError::RegistryFetch { .. } => ErrorKind::RegistryFetch,
            DecodeError::CodecConstruction { .. } => ErrorKind::CodecConstruction,
            DecodeError::Decode { .. } => ErrorKind::Decode,
            DecodeError::Encode { .. } => ErrorKind::Encode,
        }
    }

    /// Registry failures affect every partition, not just the current message
    pub fn is_fatal(&self) -> bool {
        matches!(self, DecodeError::RegistryFetch { .. })
    }

    /// Schema id of the failed message, when the header could be read
    pub fn schema_id(&self) -> Option<SchemaId> {
        match self {
            DecodeError::InputFormat { .. } => None,
            DecodeError::RegistryFetch { schema_id, .. }
            | DecodeError::CodecConstruction { schema_id, .. }
            | DecodeError::Decode { schema_id, .. }
            | DecodeError::Encode { schema_id, .. } => Some(*schema_id),
        }
    }
}

pub type DecodeResult<T> = Result<T, DecodeError>;

/// Errors that end a consumer run
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("Registry failure on {topic}/{partition} at offset {offset}: {source}")]
    Registry {
        topic: String,
        partition: i32,
        offset: i64,
        #[source]
        source: DecodeError,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Worker task failed: {0}")]
    Worker(String),
}

pub type ConsumerResult<T> = Result<T, ConsumerError>;
