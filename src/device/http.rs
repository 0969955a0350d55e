use std::time::Duration;

use async_trait::async_trait;

use crate::config::DeviceConfig;
use crate::device::backend::{CallParams, DeviceBackend};
use crate::device::types::DeviceResponse;
use crate::errors::{ScreenFlowError, ScreenFlowResult};

/// Talks to an on-device automation agent over HTTP.
///
/// Every call is a `POST {endpoint}/call` with body `{"action", "params"}`;
/// the agent answers `{"success", "data"?, "error"?}`.
pub struct HttpDeviceBackend {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpDeviceBackend {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> ScreenFlowResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_config(config: &DeviceConfig) -> ScreenFlowResult<Self> {
        Self::new(
            config.endpoint.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }
}

#[async_trait]
impl DeviceBackend for HttpDeviceBackend {
    fn name(&self) -> &str {
        &self.endpoint
    }

    async fn call(&self, action: &str, params: CallParams) -> ScreenFlowResult<DeviceResponse> {
        let body = serde_json::json!({
            "action": action,
            "params": params,
        });
        let response = self
            .client
            .post(format!("{}/call", self.endpoint))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ScreenFlowError::Device(format!(
                "{action} returned HTTP {status}: {text}"
            )));
        }
        let reply: DeviceResponse = response.json().await?;
        tracing::debug!(action, success = reply.success, "device agent replied");
        Ok(reply)
    }
}
