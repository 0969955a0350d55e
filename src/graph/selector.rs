use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    And,
    Or,
}

/// Describes how to find one UI element on screen.
///
/// Serialized with a `type` tag, matching the application documents:
/// `{"type": "ByText", "value": "Chats"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Selector {
    ByText { value: String },
    ByResourceId { value: String },
    ByClassName { value: String },
    ByContentDesc { value: String },
    ByBounds { value: String },
    #[serde(rename = "ByXPath", alias = "ByXpath")]
    ByXPath { value: String },
    Compound {
        selectors: Vec<Selector>,
        operator: LogicalOperator,
    },
}

impl Selector {
    pub fn text(value: impl Into<String>) -> Self {
        Self::ByText {
            value: value.into(),
        }
    }

    pub fn resource_id(value: impl Into<String>) -> Self {
        Self::ByResourceId {
            value: value.into(),
        }
    }

    pub fn content_desc(value: impl Into<String>) -> Self {
        Self::ByContentDesc {
            value: value.into(),
        }
    }

    pub fn class_name(value: impl Into<String>) -> Self {
        Self::ByClassName {
            value: value.into(),
        }
    }

    /// Short human-readable form used in descriptions and logs.
    pub fn describe(&self) -> String {
        match self {
            Self::ByText { value } => format!("text \"{value}\""),
            Self::ByResourceId { value } => format!("id \"{value}\""),
            Self::ByClassName { value } => format!("class \"{value}\""),
            Self::ByContentDesc { value } => format!("description \"{value}\""),
            Self::ByBounds { value } => format!("bounds {value}"),
            Self::ByXPath { value } => format!("xpath {value}"),
            Self::Compound {
                selectors,
                operator,
            } => {
                let joiner = match operator {
                    LogicalOperator::And => " and ",
                    LogicalOperator::Or => " or ",
                };
                let parts: Vec<String> = selectors.iter().map(Selector::describe).collect();
                format!("({})", parts.join(joiner))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_selector_uses_type_tag() {
        let selector: Selector =
            serde_json::from_str(r#"{"type": "ByText", "value": "Chats"}"#).unwrap();
        assert_eq!(selector, Selector::text("Chats"));
        let back = serde_json::to_value(&selector).unwrap();
        assert_eq!(back["type"], "ByText");
    }

    #[test]
    fn compound_operator_is_uppercase() {
        let selector: Selector = serde_json::from_str(
            r#"{"type": "Compound", "operator": "OR",
                "selectors": [{"type": "ByResourceId", "value": "send"},
                              {"type": "ByContentDesc", "value": "Send"}]}"#,
        )
        .unwrap();
        match &selector {
            Selector::Compound {
                selectors,
                operator,
            } => {
                assert_eq!(*operator, LogicalOperator::Or);
                assert_eq!(selectors.len(), 2);
            }
            other => panic!("expected compound, got {other:?}"),
        }
        assert_eq!(
            selector.describe(),
            "(id \"send\" or description \"Send\")"
        );
    }
}
