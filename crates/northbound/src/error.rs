//! Error types for northbound.

use thiserror::Error;

/// Northbound error type.
#[derive(Error, Debug)]
pub enum ExportError {
    /// Redis connection or operation error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// HTTP request error (registry lookups)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (settings and log files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed URL in configuration
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required application setting is absent
    #[error("Missing setting: {0}")]
    MissingSetting(String),

    /// Registry returned a non-success status
    #[error("Registry error: {status} - {message}")]
    Registry {
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },

    /// Upstream acknowledgment failed
    #[error("Acknowledge error: {0}")]
    Acknowledge(String),

    /// Unexpected data from the event source
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Dedup worker did not exit cleanly
    #[error("Worker error: {0}")]
    Worker(String),
}

/// Result type for northbound operations.
pub type ExportResult<T> = Result<T, ExportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_error_display() {
        let err = ExportError::Registry {
            status: 404,
            message: "device not found".to_string(),
        };
        assert_eq!(err.to_string(), "Registry error: 404 - device not found");
    }

    #[test]
    fn missing_setting_display() {
        let err = ExportError::MissingSetting("eventTopic".to_string());
        assert_eq!(err.to_string(), "Missing setting: eventTopic");
    }

    #[test]
    fn json_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{{{").unwrap_err();
        let err: ExportError = serde_err.into();
        assert!(err.to_string().starts_with("JSON error:"));
    }
}
