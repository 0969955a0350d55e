use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graph::selector::Selector;
use crate::state::AbstractState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeDirection {
    #[serde(alias = "UP")]
    Up,
    #[serde(alias = "DOWN")]
    Down,
    #[serde(alias = "LEFT")]
    Left,
    #[serde(alias = "RIGHT")]
    Right,
}

impl SwipeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationType {
    #[default]
    #[serde(alias = "exists")]
    Exists,
    #[serde(alias = "text_equals")]
    TextEquals,
    #[serde(alias = "text_contains")]
    TextContains,
}

/// A check over the abstract state, evaluated without touching the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum StatePredicate {
    NodeIs { node: String },
    PackageIs { package: String },
    VariablePresent { key: String },
    VariableEquals { key: String, value: Value },
}

impl StatePredicate {
    pub fn holds(&self, state: &AbstractState) -> bool {
        match self {
            Self::NodeIs { node } => state.node_id() == node,
            Self::PackageIs { package } => state.package_name.as_deref() == Some(package.as_str()),
            Self::VariablePresent { key } => state.variable(key).is_some(),
            Self::VariableEquals { key, value } => state.variable(key) == Some(value),
        }
    }
}

/// An atomic or composite UI action. Payloads are plain data; dispatch,
/// template substitution and parameter extraction live elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum Operation {
    Click {
        selector: Selector,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        relative_x: Option<f32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        relative_y: Option<f32>,
    },
    Input {
        selector: Selector,
        text_variable_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Swipe {
        direction: SwipeDirection,
        #[serde(default = "default_swipe_distance")]
        distance: f32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    LaunchApp {
        package_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    KillApp {
        package_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Wait {
        duration_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    WaitForScreen {
        node_name: String,
        #[serde(default = "default_screen_timeout")]
        timeout_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    ValidateElement {
        selector: Selector,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expected_value_key: Option<String>,
        #[serde(default)]
        validation_type: ValidationType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    ValidateState {
        predicate: StatePredicate,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Sequential {
        operations: Vec<Operation>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    NoOp,
}

fn default_swipe_distance() -> f32 {
    0.5
}

fn default_screen_timeout() -> u64 {
    3000
}

impl Operation {
    pub fn click(selector: Selector) -> Self {
        Self::Click {
            selector,
            description: None,
            relative_x: None,
            relative_y: None,
        }
    }

    pub fn input(selector: Selector, text_variable_key: impl Into<String>) -> Self {
        Self::Input {
            selector,
            text_variable_key: text_variable_key.into(),
            description: None,
        }
    }

    pub fn launch_app(package_name: impl Into<String>) -> Self {
        Self::LaunchApp {
            package_name: package_name.into(),
            description: None,
        }
    }

    /// One operation stays as-is, several become a `Sequential`.
    pub fn from_list(mut operations: Vec<Operation>) -> Option<Self> {
        match operations.len() {
            0 => None,
            1 => operations.pop(),
            _ => Some(Self::Sequential {
                operations,
                description: None,
            }),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Click { .. } => "click",
            Self::Input { .. } => "input",
            Self::Swipe { .. } => "swipe",
            Self::LaunchApp { .. } => "launch_app",
            Self::KillApp { .. } => "kill_app",
            Self::Wait { .. } => "wait",
            Self::WaitForScreen { .. } => "wait_for_screen",
            Self::ValidateElement { .. } => "validate_element",
            Self::ValidateState { .. } => "validate_state",
            Self::Sequential { .. } => "sequential",
            Self::NoOp => "no_op",
        }
    }

    pub fn children(&self) -> &[Operation] {
        match self {
            Self::Sequential { operations, .. } => operations,
            _ => &[],
        }
    }

    fn declared_description(&self) -> Option<&str> {
        match self {
            Self::Click { description, .. }
            | Self::Input { description, .. }
            | Self::Swipe { description, .. }
            | Self::LaunchApp { description, .. }
            | Self::KillApp { description, .. }
            | Self::Wait { description, .. }
            | Self::WaitForScreen { description, .. }
            | Self::ValidateElement { description, .. }
            | Self::ValidateState { description, .. }
            | Self::Sequential { description, .. } => description.as_deref(),
            Self::NoOp => None,
        }
    }

    pub fn description(&self) -> String {
        if let Some(text) = self.declared_description() {
            return text.to_string();
        }
        match self {
            Self::Click { selector, .. } => format!("Tap {}", selector.describe()),
            Self::Input {
                selector,
                text_variable_key,
                ..
            } => format!("Type {{{{{text_variable_key}}}}} into {}", selector.describe()),
            Self::Swipe {
                direction,
                distance,
                ..
            } => format!("Swipe {} by {distance}", direction.as_str()),
            Self::LaunchApp { package_name, .. } => format!("Launch {package_name}"),
            Self::KillApp { package_name, .. } => format!("Stop {package_name}"),
            Self::Wait { duration_ms, .. } => format!("Wait {duration_ms} ms"),
            Self::WaitForScreen {
                node_name,
                timeout_ms,
                ..
            } => format!("Wait up to {timeout_ms} ms for {node_name}"),
            Self::ValidateElement { selector, .. } => {
                format!("Check {} is present", selector.describe())
            }
            Self::ValidateState { predicate, .. } => format!("Check state {predicate:?}"),
            Self::Sequential { operations, .. } => {
                let steps: Vec<String> = operations.iter().map(Operation::description).collect();
                steps.join(", then ")
            }
            Self::NoOp => "Do nothing".to_string(),
        }
    }

    /// Synchronous check for state validations; `None` for every other kind.
    pub fn evaluate(&self, state: &AbstractState) -> Option<bool> {
        match self {
            Self::ValidateState { predicate, .. } => Some(predicate.holds(state)),
            _ => None,
        }
    }

    /// Planned successor of `state` after this operation runs, or `None`
    /// when the operation cannot apply there.
    pub fn apply(&self, state: &AbstractState) -> Option<AbstractState> {
        match self {
            Self::ValidateState { predicate, .. } => {
                predicate.holds(state).then(|| state.clone())
            }
            Self::LaunchApp { package_name, .. } => {
                let mut next = state.clone();
                if next.package_name.as_deref() != Some(package_name.as_str()) {
                    next.package_name = Some(package_name.clone());
                    next.activity_name = None;
                }
                Some(next)
            }
            Self::KillApp { package_name, .. } => {
                let mut next = state.clone();
                if next.package_name.as_deref() == Some(package_name.as_str()) {
                    next.package_name = None;
                    next.activity_name = None;
                }
                Some(next)
            }
            Self::Sequential { operations, .. } => operations
                .iter()
                .try_fold(state.clone(), |current, op| op.apply(&current)),
            _ => Some(state.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_camel_case_fields() {
        let op: Operation = serde_json::from_value(json!({
            "type": "Input",
            "selector": {"type": "ByResourceId", "value": "msgBox"},
            "textVariableKey": "text"
        }))
        .unwrap();
        assert_eq!(op, Operation::input(Selector::resource_id("msgBox"), "text"));
    }

    #[test]
    fn from_list_normalizes_single_operation() {
        let single = Operation::from_list(vec![Operation::NoOp]).unwrap();
        assert_eq!(single, Operation::NoOp);
        let many = Operation::from_list(vec![Operation::NoOp, Operation::NoOp]).unwrap();
        assert_eq!(many.kind(), "sequential");
        assert!(Operation::from_list(Vec::new()).is_none());
    }

    #[test]
    fn description_prefers_declared_text() {
        let op = Operation::Click {
            selector: Selector::text("Chats"),
            description: Some("Open chats tab".into()),
            relative_x: None,
            relative_y: None,
        };
        assert_eq!(op.description(), "Open chats tab");
        assert_eq!(
            Operation::click(Selector::text("Chats")).description(),
            "Tap text \"Chats\""
        );
    }

    #[test]
    fn failing_state_validation_has_no_successor() {
        let state = AbstractState::new("Chat", Some("x".into()), None);
        let op = Operation::ValidateState {
            predicate: StatePredicate::NodeIs {
                node: "Home".into(),
            },
            description: None,
        };
        assert_eq!(op.evaluate(&state), Some(false));
        assert!(op.apply(&state).is_none());

        let nested = Operation::Sequential {
            operations: vec![Operation::NoOp, op],
            description: None,
        };
        assert!(nested.apply(&state).is_none());
    }

    #[test]
    fn launch_switches_package() {
        let state = AbstractState::new("Home", Some("a".into()), Some("Main".into()));
        let next = Operation::launch_app("b").apply(&state).unwrap();
        assert_eq!(next.package_name.as_deref(), Some("b"));
        assert_eq!(next.activity_name, None);
        assert_eq!(Operation::NoOp.evaluate(&state), None);
    }
}
