use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::{json, Value};

use crate::config::TimingConfig;
use crate::device::backend::{CallParams, DeviceSession};
use crate::device::finder::find_element;
use crate::device::types::actions;
use crate::errors::{ScreenFlowError, ScreenFlowResult};
use crate::graph::operation::Operation;
use crate::graph::selector::Selector;
use crate::state::AbstractState;

/// Turns operations into device calls.
pub struct Dispatcher<'a> {
    session: &'a DeviceSession,
    timing: &'a TimingConfig,
}

fn failed(message: impl Into<String>) -> ScreenFlowError {
    ScreenFlowError::Execution(message.into())
}

impl<'a> Dispatcher<'a> {
    pub fn new(session: &'a DeviceSession, timing: &'a TimingConfig) -> Self {
        Self { session, timing }
    }

    /// Runs `operation` against the device.
    ///
    /// Operations that are accepted without doing anything are reported in
    /// `skipped` so callers can tell them apart from real successes.
    pub fn dispatch<'b>(
        &'b self,
        operation: &'b Operation,
        state: &'b AbstractState,
        skipped: &'b mut Vec<String>,
    ) -> BoxFuture<'b, ScreenFlowResult<()>> {
        async move {
            tracing::debug!(kind = operation.kind(), node = state.node_id(), "dispatching");
            match operation {
                Operation::Click {
                    selector,
                    relative_x,
                    relative_y,
                    ..
                } => {
                    let mut params = tap_params(selector, state);
                    if let Some(x) = relative_x {
                        params.insert("relative_x".into(), json!(x));
                    }
                    if let Some(y) = relative_y {
                        params.insert("relative_y".into(), json!(y));
                    }
                    self.call(actions::CLICK_ELEMENT, params).await
                }

                Operation::Input {
                    selector,
                    text_variable_key,
                    ..
                } => {
                    let text = state.variable_string(text_variable_key).unwrap_or_default();
                    self.call(actions::CLICK_ELEMENT, tap_params(selector, state))
                        .await
                        .map_err(|e| failed(format!("could not focus input: {e}")))?;
                    tokio::time::sleep(self.timing.focus_delay()).await;
                    // types into whatever holds focus after the tap
                    let mut params = CallParams::new();
                    params.insert("text".into(), Value::String(text));
                    self.call(actions::SET_INPUT_TEXT, params).await
                }

                Operation::Swipe {
                    direction,
                    distance,
                    ..
                } => {
                    let mut params = CallParams::new();
                    params.insert("direction".into(), json!(direction.as_str()));
                    params.insert("distance".into(), json!(distance));
                    self.call(actions::SWIPE, params).await
                }

                Operation::LaunchApp { package_name, .. } => {
                    self.call(actions::START_APP, package_params(package_name)).await
                }

                Operation::KillApp { package_name, .. } => {
                    self.call(actions::STOP_APP, package_params(package_name)).await
                }

                Operation::Wait { duration_ms, .. } => {
                    tokio::time::sleep(Duration::from_millis(*duration_ms)).await;
                    Ok(())
                }

                // arrival is checked by post-edge verification, not here
                Operation::WaitForScreen {
                    node_name,
                    timeout_ms,
                    ..
                } => {
                    tracing::debug!(node = %node_name, timeout_ms, "waiting for screen");
                    tokio::time::sleep(Duration::from_millis(*timeout_ms)).await;
                    Ok(())
                }

                Operation::ValidateState { predicate, .. } => match operation.evaluate(state) {
                    Some(true) => Ok(()),
                    _ => Err(failed(format!("state check failed: {predicate:?}"))),
                },

                Operation::ValidateElement { selector, .. } => {
                    tracing::warn!(
                        event = "operation_skipped",
                        selector = %selector.describe(),
                        "element validation is not dispatched"
                    );
                    skipped.push(format!("validate_element: {}", operation.description()));
                    Ok(())
                }

                Operation::Sequential { operations, .. } => {
                    for (index, child) in operations.iter().enumerate() {
                        if index > 0 {
                            tokio::time::sleep(self.timing.sequential_delay()).await;
                        }
                        self.dispatch(child, state, skipped).await.map_err(|e| {
                            failed(format!("step {} ({}) failed: {e}", index + 1, child.kind()))
                        })?;
                    }
                    Ok(())
                }

                Operation::NoOp => Ok(()),
            }
        }
        .boxed()
    }

    async fn call(&self, action: &str, params: CallParams) -> ScreenFlowResult<()> {
        if self.session.dispatch(action, params).await {
            Ok(())
        } else {
            Err(failed(format!("{action} was rejected by the device")))
        }
    }
}

fn package_params(package_name: &str) -> CallParams {
    let mut params = CallParams::new();
    params.insert("package_name".into(), json!(package_name));
    params
}

/// Locator parameters for a tap. A text selector is resolved against the
/// last element tree so the device gets a resource id when one is known.
fn tap_params(selector: &Selector, state: &AbstractState) -> CallParams {
    let mut params = CallParams::new();
    match selector {
        Selector::ByResourceId { value } => {
            params.insert("resource_id".into(), json!(value));
        }
        Selector::ByText { value } => {
            let known_id = state
                .ui_tree
                .as_ref()
                .and_then(|tree| find_element(tree, selector))
                .and_then(|element| element.resource_id.as_deref())
                .filter(|id| !id.is_empty());
            match known_id {
                Some(id) => params.insert("resource_id".into(), json!(id)),
                None => params.insert("text".into(), json!(value)),
            };
        }
        Selector::ByContentDesc { value } => {
            params.insert("content_desc".into(), json!(value));
        }
        Selector::ByClassName { value } => {
            params.insert("class_name".into(), json!(value));
        }
        Selector::ByBounds { value } => {
            params.insert("bounds".into(), json!(value));
        }
        Selector::ByXPath { value } => {
            params.insert("xpath".into(), json!(value));
        }
        Selector::Compound { .. } => {
            params.insert(
                "selector".into(),
                serde_json::to_value(selector).unwrap_or(Value::Null),
            );
        }
    }
    params
}
