//! Partition workers and the consumer that runs them
//!
//! Each partition is driven by one [`PartitionWorker`] on its own tokio
//! task. A worker handles its messages strictly in order: message N+1 is
//! not pulled from the stream until message N has been decoded and handed
//! to the [`MessageHandler`]. Workers share one [`SchemaCache`] through
//! their [`DecodePipeline`] clones and nothing else.
//!
//! Failures are split the same way as [`DecodeError`]:
//!
//! | Failure | Effect |
//! |---------|--------|
//! | malformed frame, bad schema, bad body, text encoding | logged, reported, next message |
//! | handler error | logged, reported, not marked |
//! | registry fetch | depends on [`RegistryFailurePolicy`] |
//! | transport error | ends the run |

#[cfg(feature = "kafka")]
pub mod kafka;

use crate::cache::SchemaCache;
#[cfg(feature = "kafka")]
use crate::config::KafkaConfig;
use crate::config::{AvromaConfig, ConsumerConfig, RegistryFailurePolicy};
use crate::error::{ConsumerError, ConsumerResult, DecodeError, ErrorKind};
use crate::pipeline::{DecodePipeline, PipelineMetrics};
use crate::registry::{ExternalRegistry, RetryingFetcher, SchemaFetcher};
use crate::types::{DecodedMessage, RawMessage};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Receives every successfully decoded message
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, msg: DecodedMessage) -> anyhow::Result<()>;
}

#[async_trait]
impl<F> MessageHandler for F
where
    F: Fn(DecodedMessage) -> anyhow::Result<()> + Send + Sync,
{
    async fn handle(&self, msg: DecodedMessage) -> anyhow::Result<()> {
        (self)(msg)
    }
}

/// Ordered raw messages of one partition
pub type MessageStream = BoxStream<'static, ConsumerResult<RawMessage>>;

/// One partition's message stream, as produced by a transport
pub struct PartitionSource {
    pub topic: String,
    pub partition: i32,
    pub stream: MessageStream,
}

impl PartitionSource {
    pub fn new(topic: impl Into<String>, partition: i32, stream: MessageStream) -> Self {
        Self {
            topic: topic.into(),
            partition,
            stream,
        }
    }

    /// A finite source over messages already in memory
    pub fn from_messages(
        topic: impl Into<String>,
        partition: i32,
        messages: Vec<RawMessage>,
    ) -> Self {
        let stream = futures::stream::iter(messages.into_iter().map(Ok)).boxed();
        Self::new(topic, partition, stream)
    }
}

impl std::fmt::Debug for PartitionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionSource")
            .field("topic", &self.topic)
            .field("partition", &self.partition)
            .finish_non_exhaustive()
    }
}

/// Where a message was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Decode(ErrorKind),
    Handler,
}

/// A message that was not delivered, or delivered but rejected by the handler
#[derive(Debug, Clone, Serialize)]
pub struct MessageFailure {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub stage: FailureStage,
    pub error: String,
}

/// Per-partition totals returned when a worker stops
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    pub topic: String,
    pub partition: i32,
    /// Messages pulled from the stream
    pub received: u64,
    /// Messages the handler accepted
    pub delivered: u64,
    /// Messages dropped by the pipeline
    pub skipped: u64,
    pub handler_errors: u64,
    /// Offset to resume from: one past the last marked message
    pub marked_offset: Option<i64>,
}

impl WorkerReport {
    fn new(topic: &str, partition: i32) -> Self {
        Self {
            topic: topic.to_string(),
            partition,
            ..Default::default()
        }
    }
}

/// Drives one partition through the pipeline and into the handler
pub struct PartitionWorker {
    pipeline: DecodePipeline,
    handler: Arc<dyn MessageHandler>,
    mark_messages: bool,
    on_registry_failure: RegistryFailurePolicy,
    errors: Option<UnboundedSender<MessageFailure>>,
    shutdown: CancellationToken,
}

impl PartitionWorker {
    pub fn new(
        pipeline: DecodePipeline,
        handler: Arc<dyn MessageHandler>,
        settings: &ConsumerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            pipeline,
            handler,
            mark_messages: settings.mark_messages,
            on_registry_failure: settings.on_registry_failure,
            errors: None,
            shutdown,
        }
    }

    pub fn with_error_channel(mut self, errors: UnboundedSender<MessageFailure>) -> Self {
        self.errors = Some(errors);
        self
    }

    /// Consume `source` until it ends, shutdown is requested, or a fatal
    /// error occurs.
    pub async fn run(self, source: PartitionSource) -> ConsumerResult<WorkerReport> {
        let PartitionSource {
            topic,
            partition,
            mut stream,
        } = source;
        let mut report = WorkerReport::new(&topic, partition);

        info!(topic = %topic, partition, "Partition worker started");

        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    debug!(topic = %topic, partition, "Partition worker shutting down");
                    break;
                }
                next = stream.next() => next,
            };

            let Some(item) = next else {
                debug!(topic = %topic, partition, "Partition stream ended");
                break;
            };
            let raw = item?;
            self.process(&raw, &mut report).await?;
        }

        info!(
            topic = %topic,
            partition,
            received = report.received,
            delivered = report.delivered,
            skipped = report.skipped,
            "Partition worker stopped"
        );
        Ok(report)
    }

    async fn process(&self, raw: &RawMessage, report: &mut WorkerReport) -> ConsumerResult<()> {
        report.received += 1;

        let decoded = match self.pipeline.decode(raw).await {
            Ok(decoded) => decoded,
            Err(e)
                if e.is_fatal() && self.on_registry_failure == RegistryFailurePolicy::Halt =>
            {
                error!(
                    topic = %raw.topic,
                    partition = raw.partition,
                    offset = raw.offset,
                    error = %e,
                    "Schema registry unavailable, halting"
                );
                report.skipped += 1;
                return Err(ConsumerError::Registry {
                    topic: raw.topic.clone(),
                    partition: raw.partition,
                    offset: raw.offset,
                    source: e,
                });
            }
            Err(e) => {
                report.skipped += 1;
                self.skip(raw, e);
                return Ok(());
            }
        };

        match self.handler.handle(decoded).await {
            Ok(()) => {
                report.delivered += 1;
                if self.mark_messages {
                    report.marked_offset = Some(raw.offset + 1);
                }
            }
            Err(e) => {
                report.handler_errors += 1;
                warn!(
                    topic = %raw.topic,
                    partition = raw.partition,
                    offset = raw.offset,
                    error = %e,
                    "Handler rejected message, not marking"
                );
                self.report(raw, FailureStage::Handler, format!("{:#}", e));
            }
        }
        Ok(())
    }

    fn skip(&self, raw: &RawMessage, e: DecodeError) {
        warn!(
            topic = %raw.topic,
            partition = raw.partition,
            offset = raw.offset,
            kind = %e.kind(),
            schema_id = ?e.schema_id(),
            error = %e,
            "Skipping undecodable message"
        );
        self.report(raw, FailureStage::Decode(e.kind()), e.to_string());
    }

    fn report(&self, raw: &RawMessage, stage: FailureStage, error: String) {
        let Some(errors) = &self.errors else {
            return;
        };
        let failure = MessageFailure {
            topic: raw.topic.clone(),
            partition: raw.partition,
            offset: raw.offset,
            stage,
            error,
        };
        // Receiver gone means nobody is listening any more
        let _ = errors.send(failure);
    }
}

/// Runs one [`PartitionWorker`] per partition over a shared schema cache
pub struct Consumer {
    cache: Arc<SchemaCache>,
    fetcher: Arc<dyn SchemaFetcher>,
    metrics: Arc<PipelineMetrics>,
    settings: ConsumerConfig,
    errors: Option<UnboundedSender<MessageFailure>>,
    shutdown: CancellationToken,
}

impl Consumer {
    pub fn new(fetcher: Arc<dyn SchemaFetcher>, settings: ConsumerConfig) -> Self {
        Self {
            cache: Arc::new(SchemaCache::new()),
            fetcher,
            metrics: Arc::new(PipelineMetrics::new()),
            settings,
            errors: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Consumer backed by the configured HTTP registry with retries
    pub fn from_config(config: &AvromaConfig) -> ConsumerResult<Self> {
        config
            .check()
            .map_err(|e| ConsumerError::Config(e.to_string()))?;
        let registry = ExternalRegistry::new(&config.registry)
            .map_err(|e| ConsumerError::Config(e.to_string()))?;
        let fetcher = RetryingFetcher::new(registry, config.registry.retry.clone());
        Ok(Self::new(Arc::new(fetcher), config.consumer.clone()))
    }

    /// Use a caller-owned cache, e.g. one shared with another consumer
    pub fn with_cache(mut self, cache: Arc<SchemaCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Forward per-message failures to `errors`
    pub fn with_error_channel(mut self, errors: UnboundedSender<MessageFailure>) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Cancelling this token stops every worker after its current message
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn cache(&self) -> &Arc<SchemaCache> {
        &self.cache
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    pub fn settings(&self) -> &ConsumerConfig {
        &self.settings
    }

    pub fn pipeline(&self) -> DecodePipeline {
        DecodePipeline::new(self.cache.clone(), self.fetcher.clone())
            .with_metrics(self.metrics.clone())
    }

    /// Run all partitions to completion.
    ///
    /// Returns once every source is exhausted or shutdown was requested. The
    /// first fatal error cancels the remaining workers and is returned.
    pub async fn run(
        &self,
        sources: Vec<PartitionSource>,
        handler: Arc<dyn MessageHandler>,
    ) -> ConsumerResult<Vec<WorkerReport>> {
        let run_token = self.shutdown.child_token();
        let mut workers = JoinSet::new();

        for source in sources {
            let mut worker = PartitionWorker::new(
                self.pipeline(),
                handler.clone(),
                &self.settings,
                run_token.clone(),
            );
            if let Some(errors) = &self.errors {
                worker = worker.with_error_channel(errors.clone());
            }
            workers.spawn(worker.run(source));
        }

        info!(partitions = workers.len(), "Consumer up and running");

        let mut reports = Vec::new();
        let mut first_error = None;
        while let Some(joined) = workers.join_next().await {
            let outcome = joined.map_err(|e| ConsumerError::Worker(e.to_string()));
            match outcome.and_then(|result| result) {
                Ok(report) => reports.push(report),
                Err(e) => {
                    if first_error.is_none() {
                        error!(error = %e, "Stopping all partitions");
                        run_token.cancel();
                        first_error = Some(e);
                    }
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        reports.sort_by(|a, b| (&a.topic, a.partition).cmp(&(&b.topic, b.partition)));
        info!(
            metrics = ?self.metrics.snapshot(),
            "Consumer stopped"
        );
        Ok(reports)
    }

    /// Connect to Kafka and consume every partition of the configured topics
    #[cfg(feature = "kafka")]
    pub async fn run_kafka(
        &self,
        config: &KafkaConfig,
        handler: Arc<dyn MessageHandler>,
    ) -> ConsumerResult<Vec<WorkerReport>> {
        let transport = kafka::KafkaTransport::connect(config).await?;
        let sources = transport.partition_sources(self.shutdown.clone()).await?;
        self.run(sources, handler).await
    }
}
