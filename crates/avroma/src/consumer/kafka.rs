//! Kafka transport built on rskafka
//!
//! Every partition of every configured topic becomes one
//! [`PartitionSource`]. rskafka has no consumer-group coordination, so all
//! partitions are read by this process and the start position comes from
//! `start_offset` rather than committed group offsets.

use super::{MessageStream, PartitionSource};
use crate::config::{KafkaConfig, StartOffset};
use crate::error::{ConsumerError, ConsumerResult};
use crate::types::RawMessage;
use bytes::Bytes;
use futures::StreamExt;
use rskafka::client::partition::{OffsetAt, PartitionClient, UnknownTopicHandling};
use rskafka::client::{Client, ClientBuilder};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Connected Kafka client plus the settings its partition streams use
pub struct KafkaTransport {
    client: Client,
    config: KafkaConfig,
}

impl KafkaTransport {
    /// Connect to the configured brokers, bounded by `connect_timeout_ms`
    pub async fn connect(config: &KafkaConfig) -> ConsumerResult<Self> {
        let builder = ClientBuilder::new(config.brokers.clone()).client_id(config.group.clone());

        let timeout_duration = Duration::from_millis(config.connect_timeout_ms);
        let client = tokio::time::timeout(timeout_duration, builder.build())
            .await
            .map_err(|_| {
                ConsumerError::Transport(format!(
                    "Connection timeout after {}ms to brokers: {:?}",
                    config.connect_timeout_ms, config.brokers
                ))
            })?
            .map_err(|e| ConsumerError::Transport(format!("Failed to connect to Kafka: {}", e)))?;

        info!(brokers = ?config.brokers, group = %config.group, "Connected to Kafka");
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Partition ids of `topic` as reported by the cluster metadata
    pub async fn partitions(&self, topic: &str) -> ConsumerResult<BTreeSet<i32>> {
        let topics = self
            .client
            .list_topics()
            .await
            .map_err(|e| ConsumerError::Transport(format!("Failed to list topics: {}", e)))?;

        topics
            .into_iter()
            .find(|t| t.name == topic)
            .map(|t| t.partitions)
            .ok_or_else(|| ConsumerError::Config(format!("Topic '{}' does not exist", topic)))
    }

    /// One source per partition of every configured topic
    pub async fn partition_sources(
        &self,
        shutdown: CancellationToken,
    ) -> ConsumerResult<Vec<PartitionSource>> {
        let mut sources = Vec::new();

        for topic in &self.config.topics {
            let partitions = self.partitions(topic).await?;
            info!(topic = %topic, partitions = partitions.len(), "Discovered partitions");

            for partition in partitions {
                let partition_client = self
                    .client
                    .partition_client(topic.clone(), partition, UnknownTopicHandling::Error)
                    .await
                    .map_err(|e| {
                        ConsumerError::Transport(format!(
                            "Failed to get partition client for {}/{}: {}",
                            topic, partition, e
                        ))
                    })?;

                let stream = partition_stream(
                    Arc::new(partition_client),
                    topic.clone(),
                    partition,
                    self.config.clone(),
                    shutdown.clone(),
                );
                sources.push(PartitionSource::new(topic.clone(), partition, stream));
            }
        }

        Ok(sources)
    }
}

/// Poll one partition forever, with backoff on fetch errors
fn partition_stream(
    partition_client: Arc<PartitionClient>,
    topic: String,
    partition: i32,
    config: KafkaConfig,
    shutdown: CancellationToken,
) -> MessageStream {
    let stream = async_stream::stream! {
        let offset_at = match config.start_offset {
            StartOffset::Earliest => OffsetAt::Earliest,
            StartOffset::Latest => OffsetAt::Latest,
        };

        let mut current_offset = match partition_client.get_offset(offset_at).await {
            Ok(o) => o,
            Err(e) => {
                yield Err(ConsumerError::Transport(format!(
                    "Failed to get start offset for {}/{}: {}",
                    topic, partition, e
                )));
                return;
            }
        };
        let mut current_backoff_ms = config.retry_initial_ms;

        info!(topic = %topic, partition, offset = current_offset, "Partition starting");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let records = match partition_client
                .fetch_records(
                    current_offset,
                    1..config.fetch_max_bytes,
                    config.fetch_max_wait_ms,
                )
                .await
            {
                Ok((records, _high_watermark)) => {
                    current_backoff_ms = config.retry_initial_ms;
                    records
                }
                Err(e) => {
                    warn!(
                        topic = %topic,
                        partition,
                        backoff_ms = current_backoff_ms,
                        error = %e,
                        "Failed to fetch records"
                    );
                    tokio::time::sleep(Duration::from_millis(current_backoff_ms)).await;
                    current_backoff_ms = ((current_backoff_ms as f64 * config.retry_multiplier)
                        as u64)
                        .min(config.retry_max_ms);
                    continue;
                }
            };

            if records.is_empty() {
                tokio::time::sleep(Duration::from_millis(config.empty_poll_delay_ms)).await;
                continue;
            }

            debug!(topic = %topic, partition, count = records.len(), "Fetched records");

            for record_and_offset in records {
                // Compressed batches can start before the requested offset
                if record_and_offset.offset < current_offset {
                    continue;
                }
                current_offset = record_and_offset.offset + 1;

                let record = record_and_offset.record;
                let payload = record.value.map(Bytes::from).unwrap_or_default();
                let mut msg = RawMessage::new(
                    topic.clone(),
                    partition,
                    record_and_offset.offset,
                    payload,
                );
                if let Some(key) = record.key {
                    msg = msg.with_key(key);
                }
                yield Ok(msg);
            }
        }
    };

    stream.boxed()
}
