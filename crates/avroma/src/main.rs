//! avroma command line
//!
//! ```bash
//! # Consume the configured topics, one JSON line per decoded message
//! avroma run --config avroma.yaml
//!
//! # Decode a single Confluent frame offline
//! avroma decode --schema user.avsc --hex 0000000001...
//!
//! # Check a config file without connecting anywhere
//! avroma validate --config avroma.yaml
//! ```

use anyhow::{Context, Result};
use avroma::{
    AvromaConfig, DecodePipeline, DecodedMessage, ExternalRegistry, RawMessage, SchemaCache,
    SchemaDefinition, StaticRegistry,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "avroma")]
#[command(
    author,
    version,
    about = "Decode Confluent-framed Avro messages from Kafka"
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume and print decoded messages until Ctrl+C
    Run {
        /// Configuration file
        #[arg(short, long, default_value = "avroma.yaml")]
        config: PathBuf,
    },

    /// Decode one framed message with a local schema file
    Decode {
        /// Avro schema file (.avsc)
        #[arg(short, long)]
        schema: PathBuf,

        /// Framed message as hex
        #[arg(long)]
        hex: String,

        /// Topic name to report in the output
        #[arg(long, default_value = "-")]
        topic: String,
    },

    /// Validate a configuration file
    Validate {
        #[arg(short, long, default_value = "avroma.yaml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            let config = AvromaConfig::from_file(&config)?;
            init_logging(cli.verbose || config.consumer.verbose);
            run(config).await
        }
        Commands::Decode { schema, hex, topic } => {
            init_logging(cli.verbose);
            decode(&schema, &hex, topic).await
        }
        Commands::Validate { config } => {
            init_logging(cli.verbose);
            let parsed = AvromaConfig::from_file(&config)?;
            println!("Configuration is valid");
            println!("  Brokers: {:?}", parsed.kafka.brokers);
            println!("  Topics: {:?}", parsed.kafka.topics);
            println!("  Group: {}", parsed.kafka.group);
            println!("  Registry: {}", parsed.registry.url);
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[cfg(feature = "kafka")]
async fn run(config: AvromaConfig) -> Result<()> {
    use avroma::{Consumer, MessageHandler};

    info!("Starting avroma consumer");
    info!(brokers = ?config.kafka.brokers, topics = ?config.kafka.topics, "Kafka");

    // Connectivity probe; some registries restrict /subjects, so only warn
    let registry = ExternalRegistry::new(&config.registry)?;
    if let Err(e) = registry.list_subjects().await {
        warn!(url = %registry.base_url(), error = %e, "Schema registry probe failed");
    }

    let consumer = Consumer::from_config(&config)?;

    let shutdown = consumer.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            shutdown.cancel();
        }
    });

    let handler: Arc<dyn MessageHandler> = Arc::new(print_message);
    let reports = consumer.run_kafka(&config.kafka, handler).await?;

    for report in &reports {
        info!(
            topic = %report.topic,
            partition = report.partition,
            delivered = report.delivered,
            skipped = report.skipped,
            marked_offset = ?report.marked_offset,
            "Partition summary"
        );
    }
    info!(cached_schemas = consumer.cache().len(), "avroma stopped");
    Ok(())
}

#[cfg(not(feature = "kafka"))]
async fn run(_config: AvromaConfig) -> Result<()> {
    anyhow::bail!("avroma was built without the `kafka` feature")
}

fn print_message(msg: DecodedMessage) -> Result<()> {
    println!("{}", serde_json::to_string(&msg)?);
    Ok(())
}

async fn decode(schema_path: &Path, frame_hex: &str, topic: String) -> Result<()> {
    let schema = std::fs::read_to_string(schema_path)
        .with_context(|| format!("Failed to read schema file {}", schema_path.display()))?;
    let frame = hex::decode(frame_hex.trim()).context("Frame is not valid hex")?;

    let (schema_id, _) = avroma::wire::parse_header(&frame)?;
    let registry = StaticRegistry::new().with_schema(schema_id, SchemaDefinition::from(schema));
    let pipeline = DecodePipeline::new(Arc::new(SchemaCache::new()), Arc::new(registry));

    let decoded = pipeline.decode(&RawMessage::new(topic, 0, 0, frame)).await?;
    print_message(decoded)
}
