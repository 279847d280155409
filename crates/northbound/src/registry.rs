//! HTTP client for the device registry (core-metadata).

use crate::contract::DeviceRegistry;
use crate::error::{ExportError, ExportResult};
use crate::model::Device;
use async_trait::async_trait;
use std::time::Duration;
use url::Url;

/// Route of the device resource below the registry base URL.
pub const DEVICE_ROUTE: &str = "/api/v1/device";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Device registry reached over HTTP.
#[derive(Clone, Debug)]
pub struct MetadataClient {
    http_client: reqwest::Client,
    device_url: Url,
}

impl MetadataClient {
    /// Create a client for the registry at `base_url`.
    pub fn new(base_url: &str) -> ExportResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http_client,
            device_url: Url::parse(&format!("{}{}", base_url.trim_end_matches('/'), DEVICE_ROUTE))?,
        })
    }

    /// URL of the by-name lookup for `name`, with the name percent-encoded.
    fn device_for_name_url(&self, name: &str) -> ExportResult<Url> {
        let mut url = self.device_url.clone();
        url.path_segments_mut()
            .map_err(|_| ExportError::Config(format!("{} cannot be a base URL", self.device_url)))?
            .push("name")
            .push(name);
        Ok(url)
    }
}

#[async_trait]
impl DeviceRegistry for MetadataClient {
    async fn device_for_name(&self, name: &str) -> ExportResult<Device> {
        let url = self.device_for_name_url(name)?;
        tracing::debug!(url = %url, "Looking up device");

        let response = self.http_client.get(url).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ExportError::Registry { status, message });
        }

        Ok(response.json::<Device>().await?)
    }
}
