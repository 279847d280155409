//! Northbound: one-way export of device events and device metadata.
//!
//! Northbound forwards every locally produced event to a remote endpoint and
//! announces each device's metadata the first time the device is seen.
//!
//! # Core Invariants
//!
//! 1. **At-Least-Once**: an event is acknowledged upstream only after a send
//!    succeeded; failed sends are retried with a fixed backoff, without limit
//! 2. **Announce Once**: a device is recorded as known only after its metadata
//!    was sent; failed announcements are retried on the device's next event
//! 3. **Single Owner**: the known-devices set lives in one worker task, fed by
//!    a bounded queue
//! 4. **Drain on Shutdown**: the queue is drained before the transport is
//!    released
//!
//! # Architecture
//!
//! ```text
//! Source Stream -> Pipeline -> ExportTransport -> event stream
//!       ^                          |
//!       |______ XACK <____________ +-> dedup worker -> registry -> new-device stream
//! ```

pub mod command;
pub mod config;
pub mod contract;
pub mod dedup;
pub mod delivery;
pub mod error;
pub mod logging;
pub mod model;
pub mod notifier;
pub mod pipeline;
pub mod redis_sender;
pub mod registry;
pub mod source;
pub mod transport;

#[cfg(test)]
mod tests;

pub use command::CommandHandler;
pub use config::ExportConfig;
pub use contract::{
    AckHandle, DeviceRegistry, JsonMarshaller, Marshaller, Notifier, Record, Sender,
    TransportCleanup,
};
pub use dedup::KnownDevices;
pub use error::{ExportError, ExportResult};
pub use model::{Channel, Device, Event};
pub use notifier::MetadataNotifier;
pub use pipeline::Pipeline;
pub use redis_sender::RedisStreamSender;
pub use registry::MetadataClient;
pub use source::{RedisEventSource, SourceConfig, StreamAck};
pub use transport::{ExportTransport, LifecycleState, TransportSettings};
