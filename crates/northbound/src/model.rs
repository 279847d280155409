//! Event, device and channel types exchanged with the remote endpoint.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A telemetry event produced by a local device.
///
/// Only `id` and `device` are interpreted; everything else (origin
/// timestamps, readings, ...) is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique per occurrence, not per device.
    pub id: String,
    /// Name of the originating device.
    pub device: String,
    /// Opaque remainder of the event.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Event {
    /// Create an event with an empty payload.
    pub fn new(id: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            device: device.into(),
            payload: Map::new(),
        }
    }

    /// Attach a payload field.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }
}

/// Descriptive record of a device as returned by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    /// Profile, service, protocols and anything else the registry returns.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// The two logical channels of the remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Every delivered event.
    Event,
    /// Metadata of devices seen for the first time.
    NewDevice,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Event => f.write_str("event"),
            Channel::NewDevice => f.write_str("new-device"),
        }
    }
}
