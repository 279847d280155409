//! Configuration for northbound.
//!
//! Settings are a flat string map, loaded from a JSON file or from
//! `NORTHBOUND_*` environment variables, and resolved once at startup.

use crate::error::{ExportError, ExportResult};
use crate::transport::TransportSettings;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Setting keys and their environment variable names.
const SETTING_ENV_VARS: [(&str, &str); 11] = [
    ("certFile", "NORTHBOUND_CERT_FILE"),
    ("keyFile", "NORTHBOUND_KEY_FILE"),
    ("server", "NORTHBOUND_SERVER"),
    ("clientId", "NORTHBOUND_CLIENT_ID"),
    ("userName", "NORTHBOUND_USER_NAME"),
    ("password", "NORTHBOUND_PASSWORD"),
    ("eventTopic", "NORTHBOUND_EVENT_TOPIC"),
    ("newDeviceTopic", "NORTHBOUND_NEW_DEVICE_TOPIC"),
    ("metadataUri", "NORTHBOUND_METADATA_URI"),
    ("sendFailureWaitMs", "NORTHBOUND_SEND_FAILURE_WAIT_MS"),
    ("queueCapacity", "NORTHBOUND_QUEUE_CAPACITY"),
];

const DEFAULT_SEND_FAILURE_WAIT_MS: u64 = 1000;
const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Northbound configuration.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// PEM client certificate and key for TLS client auth. Used only when
    /// both are set; may be empty.
    pub cert_file: String,
    pub key_file: String,

    /// Transport URL (`redis://host:port[/db]`)
    pub server: String,

    /// Client name announced on the transport connection
    pub client_id: String,

    /// Transport credentials (empty when unauthenticated)
    pub user_name: String,
    pub password: String,

    /// Stream key of the event channel
    pub event_topic: String,

    /// Stream key of the new-device channel
    pub new_device_topic: String,

    /// Base URL of the device registry
    pub metadata_uri: String,

    /// Wait between failed event sends
    pub send_failure_wait: Duration,

    /// Capacity of the dedup queue
    pub queue_capacity: usize,
}

impl ExportConfig {
    /// Resolve configuration from application settings.
    pub fn from_settings(settings: &HashMap<String, String>) -> ExportResult<Self> {
        let send_failure_wait_ms = optional(settings, "sendFailureWaitMs")?
            .unwrap_or(DEFAULT_SEND_FAILURE_WAIT_MS);
        let queue_capacity = optional(settings, "queueCapacity")?.unwrap_or(DEFAULT_QUEUE_CAPACITY);

        if queue_capacity == 0 {
            return Err(ExportError::Config(
                "queueCapacity must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            cert_file: required(settings, "certFile")?,
            key_file: required(settings, "keyFile")?,
            server: required(settings, "server")?,
            client_id: required(settings, "clientId")?,
            user_name: required(settings, "userName")?,
            password: required(settings, "password")?,
            event_topic: required(settings, "eventTopic")?,
            new_device_topic: required(settings, "newDeviceTopic")?,
            metadata_uri: required(settings, "metadataUri")?,
            send_failure_wait: Duration::from_millis(send_failure_wait_ms),
            queue_capacity,
        })
    }

    /// Load settings from a JSON object of string values.
    pub fn from_file(path: &Path) -> ExportResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let settings: HashMap<String, String> = serde_json::from_str(&raw)?;
        Self::from_settings(&settings)
    }

    /// Load settings from `NORTHBOUND_*` environment variables.
    pub fn from_env() -> ExportResult<Self> {
        let settings = SETTING_ENV_VARS
            .iter()
            .filter_map(|(key, var)| std::env::var(var).ok().map(|v| (key.to_string(), v)))
            .collect();
        Self::from_settings(&settings)
    }

    /// Tunables handed to the export core.
    pub fn transport_settings(&self) -> TransportSettings {
        TransportSettings {
            send_failure_wait: self.send_failure_wait,
            queue_capacity: self.queue_capacity,
        }
    }
}

fn required(settings: &HashMap<String, String>, key: &str) -> ExportResult<String> {
    settings
        .get(key)
        .cloned()
        .ok_or_else(|| ExportError::MissingSetting(key.to_string()))
}

fn optional<T: std::str::FromStr>(
    settings: &HashMap<String, String>,
    key: &str,
) -> ExportResult<Option<T>> {
    match settings.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ExportError::Config(format!("{} is not a valid number: {:?}", key, raw))),
    }
}
