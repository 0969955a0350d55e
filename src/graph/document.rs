use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::ScreenFlowResult;
use crate::graph::operation::Operation;
use crate::graph::selector::{LogicalOperator, Selector};

/// Deepest Sequential / Compound nesting accepted from a document.
pub const MAX_NESTING: usize = 16;

/// One application: its screens, the transitions between them and the
/// functions it offers.
///
/// Entries that fail to decode are dropped with a warning. Only input that
/// is not JSON at all, or lacks `packageName`, is rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDocument {
    #[serde(default)]
    pub app_name: String,
    pub package_name: String,
    #[serde(default)]
    pub nodes: Vec<Value>,
    #[serde(default)]
    pub edges: Vec<Value>,
    #[serde(default)]
    pub functions: Vec<Value>,
}

impl ConfigDocument {
    pub fn from_json(content: &str) -> ScreenFlowResult<Self> {
        Ok(serde_json::from_str(content)?)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDoc {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub activity_name: Option<String>,
    #[serde(default)]
    pub node_type: Option<String>,
    #[serde(default)]
    pub match_selectors: Vec<Value>,
    #[serde(default)]
    pub variables: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDoc {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub operation: Option<Value>,
    #[serde(default)]
    pub operations: Option<Vec<Value>>,
    #[serde(default)]
    pub validation: Option<Value>,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDoc {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub target_node_name: String,
    #[serde(default)]
    pub operation: Option<Value>,
}

/// Collects configuration warnings while still logging each one.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    pub warnings: Vec<String>,
}

impl Diagnostics {
    pub fn warn(&mut self, message: String) {
        tracing::warn!(event = "config_entry_dropped", "{message}");
        self.warnings.push(message);
    }
}

pub fn decode_entry<T: for<'de> Deserialize<'de>>(
    value: &Value,
    what: &str,
    diag: &mut Diagnostics,
) -> Option<T> {
    match serde_json::from_value::<T>(value.clone()) {
        Ok(entry) => Some(entry),
        Err(e) => {
            diag.warn(format!("skipping malformed {what}: {e}"));
            None
        }
    }
}

fn type_tag(value: &Value) -> Option<&str> {
    value.get("type").and_then(Value::as_str)
}

pub fn decode_selector(value: &Value, diag: &mut Diagnostics) -> Option<Selector> {
    decode_selector_at(value, 0, diag)
}

fn decode_selector_at(value: &Value, depth: usize, diag: &mut Diagnostics) -> Option<Selector> {
    if depth > MAX_NESTING {
        diag.warn(format!("selector nested deeper than {MAX_NESTING} levels dropped"));
        return None;
    }
    if type_tag(value) == Some("Compound") {
        let children = value.get("selectors").and_then(Value::as_array);
        let operator = value
            .get("operator")
            .cloned()
            .and_then(|op| serde_json::from_value::<LogicalOperator>(op).ok());
        let (Some(children), Some(operator)) = (children, operator) else {
            diag.warn(format!("compound selector without selectors/operator dropped: {value}"));
            return None;
        };
        let selectors: Vec<Selector> = children
            .iter()
            .filter_map(|child| decode_selector_at(child, depth + 1, diag))
            .collect();
        if selectors.is_empty() {
            diag.warn("compound selector with no valid children dropped".to_string());
            return None;
        }
        return Some(Selector::Compound {
            selectors,
            operator,
        });
    }
    decode_entry(value, "selector", diag)
}

pub fn decode_operation(value: &Value, diag: &mut Diagnostics) -> Option<Operation> {
    decode_operation_at(value, 0, diag)
}

fn decode_operation_at(value: &Value, depth: usize, diag: &mut Diagnostics) -> Option<Operation> {
    if depth > MAX_NESTING {
        diag.warn(format!("operation nested deeper than {MAX_NESTING} levels dropped"));
        return None;
    }
    let Some(object) = value.as_object() else {
        diag.warn(format!("operation is not an object: {value}"));
        return None;
    };

    if type_tag(value) == Some("Sequential") {
        let children = object
            .get("operations")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|child| decode_operation_at(child, depth + 1, diag))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        if children.is_empty() {
            diag.warn("sequential operation with no valid children dropped".to_string());
            return None;
        }
        let description = object
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);
        return Some(Operation::Sequential {
            operations: children,
            description,
        });
    }

    let mut object = object.clone();
    if let Some(raw) = object.get("selector").cloned() {
        let selector = decode_selector_at(&raw, depth + 1, diag)?;
        match serde_json::to_value(&selector) {
            Ok(clean) => {
                object.insert("selector".to_string(), clean);
            }
            Err(e) => {
                diag.warn(format!("selector could not be re-encoded: {e}"));
                return None;
            }
        }
    }
    decode_entry(&Value::Object(object), "operation", diag)
}
