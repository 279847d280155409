//! Main pipeline loop: source stream → export transport.

use crate::contract::AckHandle;
use crate::error::{ExportError, ExportResult};
use crate::model::Event;
use crate::source::RedisEventSource;
use crate::transport::ExportTransport;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Feeds source entries, one at a time, through the export transport.
pub struct Pipeline {
    source: RedisEventSource,
    transport: ExportTransport,
}

impl Pipeline {
    pub fn new(source: RedisEventSource, transport: ExportTransport) -> Self {
        Self { source, transport }
    }

    /// Run until the future is dropped.
    pub async fn run(&mut self) -> ExportResult<()> {
        info!(
            stream = %self.source.config().stream_key,
            consumer = %self.source.config().consumer_name,
            "Starting export pipeline"
        );

        loop {
            if let Err(e) = self.process_one().await {
                error!(error = %e, "Error processing source entry");

                // On source errors, wait and reconnect before the next read
                match &e {
                    ExportError::Redis(_) => {
                        warn!("Source error, attempting to reconnect...");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        if let Err(reconnect_err) = self.source.reconnect().await {
                            error!(error = %reconnect_err, "Failed to reconnect to source");
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                    // For other errors, brief pause before continuing
                    _ => tokio::time::sleep(Duration::from_millis(100)).await,
                }
            }
        }
    }

    /// Forward one source entry.
    async fn process_one(&mut self) -> ExportResult<()> {
        // Read the next entry: pending replay first, then new entries
        let message = match self.source.read_next().await? {
            Some(message) => message,
            None => {
                // Block timeout expired or pending replay just finished
                debug!("No entries available, continuing to poll...");
                return Ok(());
            }
        };

        // The ack is only issued by the transport, after a send succeeds
        let ack = self.source.ack_handle(&message);

        let event: Event = match serde_json::from_slice(&message.event_json) {
            Ok(event) => event,
            Err(e) => {
                // Would fail the same way on every redelivery.
                warn!(
                    message_id = %message.message_id,
                    error = %e,
                    "Undecodable source entry, acknowledging without export"
                );
                return ack.acknowledge().await;
            }
        };

        // Returns once the event is sent; a stuck transport blocks here and
        // the entry stays pending until then
        self.transport.deliver(&ack, vec![event]).await;
        Ok(())
    }

    /// Stop reading and hand the transport back for shutdown.
    pub fn into_transport(self) -> ExportTransport {
        self.transport
    }
}
