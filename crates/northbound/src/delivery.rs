//! Foreground delivery with unbounded retry.

use crate::contract::{AckHandle, Marshaller, Record, Sender};
use crate::model::{Channel, Event};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Forwards single events on the event channel.
///
/// A send that keeps failing keeps the caller waiting: events are never
/// dropped because the transport is down.
pub struct DeliveryEngine {
    sender: Arc<dyn Sender>,
    marshaller: Arc<dyn Marshaller>,
    send_failure_wait: Duration,
}

impl DeliveryEngine {
    pub fn new(
        sender: Arc<dyn Sender>,
        marshaller: Arc<dyn Marshaller>,
        send_failure_wait: Duration,
    ) -> Self {
        Self {
            sender,
            marshaller,
            send_failure_wait,
        }
    }

    /// Deliver one event and acknowledge it upstream.
    ///
    /// Returns `false` only when the event could not be serialized, in which
    /// case nothing was sent and nothing acknowledged.
    pub async fn handle_event(&self, ack: &dyn AckHandle, event: &Event) -> bool {
        let bytes = match self.marshaller.marshal(Record::Event(event)) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(device = %event.device, "marshal failed for {} ({})", event.id, e);
                return false;
            }
        };

        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            if self.sender.send(Channel::Event, &bytes).await {
                break;
            }

            debug!(
                event_id = %event.id,
                attempt,
                wait_ms = self.send_failure_wait.as_millis() as u64,
                "Send failed, retrying"
            );
            tokio::time::sleep(self.send_failure_wait).await;
        }

        debug!(attempts = attempt, "sent for {}", event.id);

        if let Err(e) = ack.acknowledge().await {
            error!(event_id = %event.id, error = %e, "Acknowledge failed after send");
        }

        true
    }
}
