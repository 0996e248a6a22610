//! # avroma
//!
//! Decode Avro messages read from Kafka in the Confluent wire format and hand
//! them to a callback as JSON text.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Consumer                                                     │
//! │  ├── PartitionWorker (one tokio task per partition)           │
//! │  │     stream ──► DecodePipeline ──► MessageHandler           │
//! │  └── shared Arc<SchemaCache>                                  │
//! ├──────────────────────────────────────────────────────────────┤
//! │  DecodePipeline                                               │
//! │  ├── wire header   [0x00][schema id: u32 BE][avro body]       │
//! │  ├── SchemaCache   id → schema text, reference counted        │
//! │  ├── SchemaFetcher registry lookup on cache miss              │
//! │  └── AvroCodec     binary body → Avro JSON text               │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Transport (feature `kafka`, rskafka)                         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use avroma::{AvromaConfig, Consumer, DecodedMessage};
//! use std::sync::Arc;
//!
//! let config = AvromaConfig::new()
//!     .brokers(["localhost:9092"])
//!     .topics(["orders"])
//!     .group("order-audit")
//!     .schema_registry_url("http://localhost:8081");
//!
//! let consumer = Consumer::from_config(&config)?;
//! let handler = Arc::new(|msg: DecodedMessage| {
//!     println!("{} @ {}: {}", msg.topic, msg.offset, msg.value);
//!     Ok(())
//! });
//! consumer.run_kafka(&config.kafka, handler).await?;
//! ```
//!
//! ## Decoding without Kafka
//!
//! ```rust
//! use avroma::{wire, DecodePipeline, RawMessage, SchemaCache, SchemaId, StaticRegistry};
//! use std::sync::Arc;
//!
//! let registry = StaticRegistry::new().with_schema(SchemaId::new(1), r#""string""#);
//! let pipeline = DecodePipeline::new(Arc::new(SchemaCache::new()), Arc::new(registry));
//!
//! let frame = wire::frame(SchemaId::new(1), &[0x04, b'h', b'i']);
//! let msg = RawMessage::new("greetings", 0, 0, frame);
//!
//! let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! let decoded = rt.block_on(pipeline.decode(&msg)).unwrap();
//! assert_eq!(decoded.value, r#""hi""#);
//! ```

pub mod avro;
pub mod cache;
pub mod config;
pub mod consumer;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod types;
pub mod wire;

pub use avro::{AvroCodec, AvroError};
pub use cache::SchemaCache;
pub use config::{
    AvromaConfig, ConsumerConfig, KafkaConfig, RegistryConfig, RegistryFailurePolicy,
    RetryConfig, SensitiveString, StartOffset,
};
#[cfg(feature = "kafka")]
pub use consumer::kafka::KafkaTransport;
pub use consumer::{
    Consumer, FailureStage, MessageFailure, MessageHandler, MessageStream, PartitionSource,
    PartitionWorker, WorkerReport,
};
pub use error::{
    ConsumerError, ConsumerResult, DecodeError, DecodeResult, ErrorKind, RegistryError,
    RegistryResult,
};
pub use pipeline::{DecodePipeline, PipelineMetrics, PipelineMetricsSnapshot};
pub use registry::{ExternalRegistry, RetryingFetcher, SchemaFetcher, StaticRegistry};
pub use types::{DecodedMessage, RawMessage, SchemaDefinition, SchemaId};
