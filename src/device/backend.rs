use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::device::types::{actions, DeviceResponse, PageInfo};
use crate::errors::{ScreenFlowError, ScreenFlowResult};

pub type CallParams = Map<String, Value>;

/// The device automation agent: one named action per call.
/// New transports only need to implement this trait.
#[async_trait]
pub trait DeviceBackend: Send + Sync {
    /// Identifier used in logs.
    fn name(&self) -> &str;

    async fn call(&self, action: &str, params: CallParams) -> ScreenFlowResult<DeviceResponse>;
}

/// Serializes every call made against one live UI session.
pub struct DeviceSession {
    backend: Arc<dyn DeviceBackend>,
    gate: Mutex<()>,
}

impl DeviceSession {
    pub fn new(backend: Arc<dyn DeviceBackend>) -> Self {
        Self {
            backend,
            gate: Mutex::new(()),
        }
    }

    pub async fn call(&self, action: &str, params: CallParams) -> ScreenFlowResult<DeviceResponse> {
        let _guard = self.gate.lock().await;
        tracing::debug!(backend = self.backend.name(), action, ?params, "device call");
        self.backend.call(action, params).await
    }

    /// Dispatches `action` and reduces the reply to its success flag.
    /// Transport errors count as failure.
    pub async fn dispatch(&self, action: &str, params: CallParams) -> bool {
        match self.call(action, params).await {
            Ok(response) => {
                if !response.success {
                    tracing::warn!(
                        action,
                        error = response.error.as_deref().unwrap_or(""),
                        "device reported failure"
                    );
                }
                response.success
            }
            Err(e) => {
                tracing::warn!(action, error = %e, "device call failed");
                false
            }
        }
    }

    pub async fn page_info(&self) -> ScreenFlowResult<PageInfo> {
        let response = self.call(actions::GET_PAGE_INFO, CallParams::new()).await?;
        if !response.success {
            return Err(ScreenFlowError::Device(
                response
                    .error
                    .unwrap_or_else(|| "get_page_info reported failure".to_string()),
            ));
        }
        let data = response
            .data
            .ok_or_else(|| ScreenFlowError::Device("get_page_info returned no data".into()))?;
        Ok(serde_json::from_value(data)?)
    }
}
