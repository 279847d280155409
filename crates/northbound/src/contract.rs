//! Capability traits for the collaborators the export core depends on.
//!
//! Each trait has a single job so tests can substitute hand-written stubs.

use crate::error::ExportResult;
use crate::model::{Channel, Device, Event};
use async_trait::async_trait;
use serde::{Serialize, Serializer};

/// One-shot transmission to the remote endpoint.
///
/// `false` means "try later"; implementations never panic on transport
/// failure. Must be safe to call concurrently from the delivery path and the
/// dedup worker.
#[async_trait]
pub trait Sender: Send + Sync {
    async fn send(&self, channel: Channel, payload: &[u8]) -> bool;
}

/// Announces a device's metadata for the device of `event`.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &Event) -> bool;
}

/// Lookup of a device's descriptive record by name.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    async fn device_for_name(&self, name: &str) -> ExportResult<Device>;
}

/// Tells the upstream event source that an event was durably forwarded.
#[async_trait]
pub trait AckHandle: Send + Sync {
    async fn acknowledge(&self) -> ExportResult<()>;
}

/// Releases the resources held by the transport. Called once at shutdown.
#[async_trait]
pub trait TransportCleanup: Send + Sync {
    async fn clean_up(&self);
}

/// A value the core needs turned into bytes.
#[derive(Debug, Clone, Copy)]
pub enum Record<'a> {
    Event(&'a Event),
    Device(&'a Device),
}

impl Serialize for Record<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Record::Event(event) => event.serialize(serializer),
            Record::Device(device) => device.serialize(serializer),
        }
    }
}

/// Structured-to-bytes serialization.
pub trait Marshaller: Send + Sync {
    fn marshal(&self, record: Record<'_>) -> ExportResult<Vec<u8>>;
}

/// JSON wire encoding used in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMarshaller;

impl Marshaller for JsonMarshaller {
    fn marshal(&self, record: Record<'_>) -> ExportResult<Vec<u8>> {
        Ok(serde_json::to_vec(&record)?)
    }
}
