//! Background worker that announces each device once.
//!
//! The worker is the only reader and writer of the known-devices set. Events
//! reach it through the bounded delivery queue, so the set needs no lock.

use crate::contract::Notifier;
use crate::model::Event;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Devices successfully announced during this process's lifetime.
///
/// A device that is absent was either never seen or its announcement failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownDevices {
    devices: HashSet<String>,
}

impl KnownDevices {
    pub fn contains(&self, device: &str) -> bool {
        self.devices.contains(device)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.devices.iter().map(String::as_str)
    }

    fn record(&mut self, device: String) {
        self.devices.insert(device);
    }
}

/// Consume the delivery queue until it is closed and drained.
///
/// Returns the final known-devices set so the coordinator can report it.
pub async fn run_dedup_worker(
    mut events: mpsc::Receiver<Event>,
    notifier: Arc<dyn Notifier>,
) -> KnownDevices {
    let mut known = KnownDevices::default();

    while let Some(event) = events.recv().await {
        if known.contains(&event.device) {
            continue;
        }

        // Failed announcements are retried by the device's next event.
        if notifier.notify(&event).await {
            debug!(device = %event.device, "detected new device {}", event.device);
            known.record(event.device);
        }
    }

    info!(known_devices = known.len(), "Dedup worker drained and stopped");
    known
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_devices_starts_empty() {
        let known = KnownDevices::default();
        assert!(known.is_empty());
        assert!(!known.contains("d1"));
    }

    #[test]
    fn known_devices_records_once() {
        let mut known = KnownDevices::default();
        known.record("d1".to_string());
        known.record("d1".to_string());

        assert_eq!(known.len(), 1);
        assert_eq!(known.iter().collect::<Vec<_>>(), vec!["d1"]);
    }
}
