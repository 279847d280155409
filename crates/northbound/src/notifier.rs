//! Registry query-and-forward for newly seen devices.

use crate::contract::{DeviceRegistry, Marshaller, Notifier, Record, Sender};
use crate::model::{Channel, Event};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::error;

/// Fetches a device's record from the registry and forwards it on the
/// new-device channel.
///
/// Makes a single attempt. Retrying is left to the dedup worker, which asks
/// again the next time the device emits an event.
pub struct MetadataNotifier {
    sender: Arc<dyn Sender>,
    marshaller: Arc<dyn Marshaller>,
    registry: Arc<dyn DeviceRegistry>,
}

impl MetadataNotifier {
    pub fn new(
        sender: Arc<dyn Sender>,
        marshaller: Arc<dyn Marshaller>,
        registry: Arc<dyn DeviceRegistry>,
    ) -> Self {
        Self {
            sender,
            marshaller,
            registry,
        }
    }
}

#[async_trait]
impl Notifier for MetadataNotifier {
    async fn notify(&self, event: &Event) -> bool {
        let device = match self.registry.device_for_name(&event.device).await {
            Ok(device) => device,
            Err(e) => {
                error!(device = %event.device, "device call failed for {} ({})", event.id, e);
                return false;
            }
        };

        let bytes = match self.marshaller.marshal(Record::Device(&device)) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(device = %event.device, "marshal failed for {} ({})", event.id, e);
                return false;
            }
        };

        self.sender.send(Channel::NewDevice, &bytes).await
    }
}
