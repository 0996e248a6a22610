//! Per-message decode pipeline
//!
//! ```text
//! payload ──► parse header ──► resolve schema ──► build codec ──► decode body ──► encode text
//!                                  │      ▲
//!                           miss   ▼      │ add + re-read
//!                               SchemaFetcher
//! ```
//!
//! A [`DecodePipeline`] holds no per-message state. Every partition worker
//! gets its own clone and all clones share one [`SchemaCache`], so each
//! schema id costs at most a handful of registry round-trips per process.
//! Concurrent misses for the same id are not coalesced: both callers fetch
//! and both register, and the cache keeps whichever definition landed last.

use crate::avro::AvroCodec;
use crate::cache::SchemaCache;
use crate::error::{DecodeError, DecodeResult};
use crate::registry::SchemaFetcher;
use crate::types::{DecodedMessage, RawMessage, SchemaDefinition, SchemaId};
use crate::wire;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Lock-free counters for the decode pipeline
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// Messages handed to `decode`
    pub messages: AtomicU64,
    /// Messages decoded successfully
    pub decoded: AtomicU64,
    /// Messages that failed at any step
    pub failed: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    /// Registry round-trips, successful or not
    pub registry_fetches: AtomicU64,
    pub registry_errors: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture a point-in-time snapshot of all counters.
    #[inline]
    pub fn snapshot(&self) -> PipelineMetricsSnapshot {
        PipelineMetricsSnapshot {
            messages: self.messages.load(Ordering::Relaxed),
            decoded: self.decoded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            registry_fetches: self.registry_fetches.load(Ordering::Relaxed),
            registry_errors: self.registry_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of [`PipelineMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineMetricsSnapshot {
    pub messages: u64,
    pub decoded: u64,
    pub failed: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub registry_fetches: u64,
    pub registry_errors: u64,
}

impl PipelineMetricsSnapshot {
    /// Fraction of schema lookups served from the cache
    #[inline]
    pub fn cache_hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            return 0.0;
        }
        self.cache_hits as f64 / lookups as f64
    }
}

/// Turns Confluent-framed Avro payloads into [`DecodedMessage`]s
#[derive(Clone)]
pub struct DecodePipeline {
    cache: Arc<SchemaCache>,
    fetcher: Arc<dyn SchemaFetcher>,
    metrics: Arc<PipelineMetrics>,
}

impl DecodePipeline {
    pub fn new(cache: Arc<SchemaCache>, fetcher: Arc<dyn SchemaFetcher>) -> Self {
        Self {
            cache,
            fetcher,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Share an existing metrics instance, e.g. one owned by the consumer
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn cache(&self) -> &Arc<SchemaCache> {
        &self.cache
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Run one message through the pipeline.
    pub async fn decode(&self, msg: &RawMessage) -> DecodeResult<DecodedMessage> {
        self.metrics.messages.fetch_add(1, Ordering::Relaxed);

        let result = self.run(msg).await;
        match &result {
            Ok(decoded) => {
                self.metrics.decoded.fetch_add(1, Ordering::Relaxed);
                trace!(
                    topic = %msg.topic,
                    partition = msg.partition,
                    offset = msg.offset,
                    schema_id = %decoded.schema_id,
                    "Decoded message"
                );
            }
            Err(_) => {
                self.metrics.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }

    async fn run(&self, msg: &RawMessage) -> DecodeResult<DecodedMessage> {
        let (schema_id, body) = wire::parse_header(&msg.payload)?;
        let definition = self.resolve_schema(schema_id).await?;

        // Built per message; the cache holds schema text, not codecs.
        let codec = AvroCodec::new(&definition)
            .map_err(|source| DecodeError::CodecConstruction { schema_id, source })?;
        let value = codec
            .decode_binary(body)
            .map_err(|source| DecodeError::Decode { schema_id, source })?;
        let text = codec
            .encode_text(&value)
            .map_err(|source| DecodeError::Encode { schema_id, source })?;

        Ok(DecodedMessage {
            schema_id,
            topic: msg.topic.clone(),
            partition: msg.partition,
            offset: msg.offset,
            key: msg
                .key
                .as_deref()
                .map(|k| String::from_utf8_lossy(k).into_owned())
                .unwrap_or_default(),
            value: text,
        })
    }

    /// Cached definition for `schema_id`, fetching and registering it on a miss.
    ///
    /// After registering, the definition is read back from the cache so every
    /// worker decodes with the same text when two of them raced on the miss.
    pub async fn resolve_schema(&self, schema_id: SchemaId) -> DecodeResult<SchemaDefinition> {
        if let Some(definition) = self.cache.get(schema_id) {
            self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(definition);
        }

        self.metrics.cache_misses.fetch_add(1, Ordering::Relaxed);
        info!(schema_id = %schema_id, "Schema not found in cache, fetching from registry");

        self.metrics.registry_fetches.fetch_add(1, Ordering::Relaxed);
        let fetched = match self.fetcher.fetch_schema(schema_id).await {
            Ok(definition) => definition,
            Err(source) => {
                self.metrics.registry_errors.fetch_add(1, Ordering::Relaxed);
                return Err(DecodeError::RegistryFetch { schema_id, source });
            }
        };

        self.cache.add(schema_id, fetched.clone());
        debug!(schema_id = %schema_id, "Registered schema in cache");

        match self.cache.get(schema_id) {
            Some(definition) => Ok(definition),
            None => {
                warn!(
                    schema_id = %schema_id,
                    "Schema evicted between registration and read-back, using fetched copy"
                );
                Ok(fetched)
            }
        }
    }
}

impl std::fmt::Debug for DecodePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodePipeline")
            .field("cached_schemas", &self.cache.len())
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}
