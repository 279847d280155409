//! Northbound binary entry point.
//!
//! Usage: northbound [--settings <file>] [--source-stream <key>]
//!
//! Without --settings, application settings are read from `NORTHBOUND_*`
//! environment variables.

use clap::Parser;
use northbound::logging::{self, LogConfig};
use northbound::{
    ExportConfig, ExportResult, ExportTransport, JsonMarshaller, MetadataClient,
    MetadataNotifier, Pipeline, RedisEventSource, RedisStreamSender, SourceConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Northbound: one-way export of device events and metadata.
#[derive(Parser, Debug)]
#[command(name = "northbound")]
#[command(about = "Forwards device events and new-device metadata to a remote endpoint")]
struct Args {
    /// JSON file of application settings.
    #[arg(long, env = "NORTHBOUND_SETTINGS")]
    settings: Option<PathBuf>,

    /// Redis URL of the local event source.
    #[arg(long, env = "NORTHBOUND_SOURCE_URL", default_value = "redis://127.0.0.1:6379")]
    source_url: String,

    /// Stream the local producers write events to.
    #[arg(long, env = "NORTHBOUND_SOURCE_STREAM", default_value = "edge:events")]
    source_stream: String,

    /// Consumer group on the source stream.
    #[arg(long, env = "NORTHBOUND_SOURCE_GROUP", default_value = "northbound")]
    source_group: String,

    /// Consumer name in the group. Keep it stable across restarts so
    /// unacknowledged entries are replayed.
    #[arg(long, env = "NORTHBOUND_SOURCE_CONSUMER", default_value = "northbound")]
    source_consumer: String,

    /// XREADGROUP block timeout in milliseconds.
    #[arg(long, default_value = "5000")]
    block_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Also write JSON logs to this file.
    #[arg(long, env = "NORTHBOUND_LOG_FILE")]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExportResult<()> {
    let args = Args::parse();

    logging::init_with_config(&LogConfig {
        default_level: args.log_level.clone(),
        log_path: args.log_file.clone(),
    })?;

    info!("Northbound starting...");

    let config = match &args.settings {
        Some(path) => ExportConfig::from_file(path)?,
        None => ExportConfig::from_env()?,
    };

    info!(
        client_id = %config.client_id,
        event_topic = %config.event_topic,
        new_device_topic = %config.new_device_topic,
        metadata_uri = %config.metadata_uri,
        send_failure_wait_ms = config.send_failure_wait.as_millis() as u64,
        "Configuration loaded"
    );

    let sender = Arc::new(RedisStreamSender::connect(&config).await?);
    let marshaller = Arc::new(JsonMarshaller);
    let registry = Arc::new(MetadataClient::new(&config.metadata_uri)?);
    let notifier = Arc::new(MetadataNotifier::new(
        sender.clone(),
        marshaller.clone(),
        registry,
    ));
    let transport = ExportTransport::new(
        config.transport_settings(),
        sender.clone(),
        notifier,
        marshaller,
        sender,
    );

    let mut source_config = SourceConfig::new(args.source_url, args.source_stream);
    source_config.consumer_group = args.source_group;
    source_config.consumer_name = args.source_consumer;
    source_config.block_timeout_ms = args.block_ms;
    let source = RedisEventSource::connect(source_config).await?;

    let mut pipeline = Pipeline::new(source, transport);

    let ctrl_c = tokio::signal::ctrl_c();

    let outcome = tokio::select! {
        result = pipeline.run() => {
            if let Err(e) = &result {
                error!(error = %e, "Pipeline exited with error");
            }
            result
        }
        _ = ctrl_c => {
            info!("Received shutdown signal, draining...");
            Ok(())
        }
    };

    let mut transport = pipeline.into_transport();
    transport.shutdown().await?;
    info!("Northbound stopped");

    outcome
}
