use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::device::types::ElementNode;

/// Node id used when the foreground screen matches no declared node.
pub const UNKNOWN_NODE: &str = "unknown";
/// Node id of the synthetic state used when the device cannot be queried.
pub const SYSTEM_HOME_NODE: &str = "system_home";

pub type Variables = HashMap<String, Value>;

/// Graph-level state: an opaque node id plus a variable bag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenericState {
    pub id: String,
    #[serde(default)]
    pub variables: Variables,
}

/// Where an execution currently is, as far as the engine can tell.
///
/// Never mutated in place once shared; every transition produces a copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AbstractState {
    pub state: GenericState,
    pub package_name: Option<String>,
    pub activity_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_tree: Option<ElementNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
}

impl AbstractState {
    pub fn new(
        node_id: impl Into<String>,
        package_name: Option<String>,
        activity_name: Option<String>,
    ) -> Self {
        Self {
            state: GenericState {
                id: node_id.into(),
                variables: Variables::new(),
            },
            package_name,
            activity_name,
            ..Self::default()
        }
    }

    /// Degraded state used when the device never answered.
    pub fn system_home() -> Self {
        Self::new(SYSTEM_HOME_NODE, None, None)
    }

    pub fn node_id(&self) -> &str {
        &self.state.id
    }

    pub fn variables(&self) -> &Variables {
        &self.state.variables
    }

    pub fn variable(&self, key: &str) -> Option<&Value> {
        self.state.variables.get(key)
    }

    /// Variable rendered as text; strings are taken verbatim.
    pub fn variable_string(&self, key: &str) -> Option<String> {
        self.variable(key).map(value_to_string)
    }

    /// Copy with `extra` merged on top of the current variables.
    pub fn with_variables(&self, extra: &Variables) -> Self {
        let mut next = self.clone();
        next.state
            .variables
            .extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        next
    }

    pub fn with_error(&self, error: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.last_error = Some(error.into());
        next
    }

    /// Same foreground package and activity as `other`.
    pub fn same_screen(&self, other: &AbstractState) -> bool {
        self.package_name == other.package_name && self.activity_name == other.activity_name
    }
}

pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// `false`, `null`, `0`, `""` and empty collections are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
