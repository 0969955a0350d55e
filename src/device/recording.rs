use std::collections::{HashSet, VecDeque};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::device::backend::{CallParams, DeviceBackend};
use crate::device::types::{actions, DeviceResponse, PageInfo};
use crate::errors::ScreenFlowResult;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedCall {
    pub action: String,
    pub params: CallParams,
}

#[derive(Debug, Default)]
struct Script {
    current: Option<PageInfo>,
    transitions: VecDeque<(String, PageInfo)>,
    failing: HashSet<String>,
    page_failures: u32,
    calls: Vec<RecordedCall>,
}

/// Scripted in-process backend for dry runs and tests.
///
/// Every call is recorded. `get_page_info` reports the current page; a
/// successful dispatch of the action at the head of the transition queue
/// switches the current page.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    script: Mutex<Script>,
}

impl RecordingBackend {
    pub fn new(initial: PageInfo) -> Self {
        Self {
            script: Mutex::new(Script {
                current: Some(initial),
                ..Script::default()
            }),
        }
    }

    /// A device that never answers `get_page_info`.
    pub fn unreachable() -> Self {
        Self::default()
    }

    pub fn with_transition(mut self, action: &str, page: PageInfo) -> Self {
        self.script
            .get_mut()
            .transitions
            .push_back((action.to_string(), page));
        self
    }

    pub fn failing(mut self, action: &str) -> Self {
        self.script.get_mut().failing.insert(action.to_string());
        self
    }

    /// The next `count` page reads fail.
    pub fn with_page_failures(mut self, count: u32) -> Self {
        self.script.get_mut().page_failures = count;
        self
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.script.lock().await.calls.clone()
    }

    /// Recorded calls other than page reads.
    pub async fn dispatched(&self) -> Vec<RecordedCall> {
        self.script
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.action != actions::GET_PAGE_INFO)
            .cloned()
            .collect()
    }

    pub async fn count(&self, action: &str) -> usize {
        self.script
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.action == action)
            .count()
    }
}

#[async_trait]
impl DeviceBackend for RecordingBackend {
    fn name(&self) -> &str {
        "recording"
    }

    async fn call(&self, action: &str, params: CallParams) -> ScreenFlowResult<DeviceResponse> {
        let mut script = self.script.lock().await;
        script.calls.push(RecordedCall {
            action: action.to_string(),
            params,
        });

        if action == actions::GET_PAGE_INFO {
            if script.page_failures > 0 {
                script.page_failures -= 1;
                return Ok(DeviceResponse::failed("page read failed"));
            }
            return Ok(match &script.current {
                Some(page) => DeviceResponse::ok_with(serde_json::to_value(page)?),
                None => DeviceResponse::failed("device unreachable"),
            });
        }

        if script.failing.contains(action) {
            return Ok(DeviceResponse::failed(format!("{action} failed")));
        }
        if script
            .transitions
            .front()
            .is_some_and(|(trigger, _)| trigger == action)
        {
            if let Some((_, page)) = script.transitions.pop_front() {
                script.current = Some(page);
            }
        }
        Ok(DeviceResponse::ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::backend::DeviceSession;
    use std::sync::Arc;

    #[tokio::test]
    async fn transitions_follow_dispatched_actions() {
        let backend = Arc::new(
            RecordingBackend::new(PageInfo::new("app", Some(".Main")))
                .with_transition(actions::CLICK_ELEMENT, PageInfo::new("app", Some(".Detail"))),
        );
        let session = DeviceSession::new(backend.clone());

        assert_eq!(session.page_info().await.unwrap().activity_name.as_deref(), Some(".Main"));
        assert!(session.dispatch(actions::SWIPE, CallParams::new()).await);
        assert_eq!(session.page_info().await.unwrap().activity_name.as_deref(), Some(".Main"));
        assert!(session.dispatch(actions::CLICK_ELEMENT, CallParams::new()).await);
        assert_eq!(session.page_info().await.unwrap().activity_name.as_deref(), Some(".Detail"));

        assert_eq!(backend.dispatched().await.len(), 2);
        assert_eq!(backend.count(actions::GET_PAGE_INFO).await, 3);
    }

    #[tokio::test]
    async fn failures_are_reported_not_raised() {
        let backend = Arc::new(
            RecordingBackend::unreachable().failing(actions::START_APP),
        );
        let session = DeviceSession::new(backend);
        assert!(session.page_info().await.is_err());
        assert!(!session.dispatch(actions::START_APP, CallParams::new()).await);
    }
}
