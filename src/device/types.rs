use serde::{Deserialize, Serialize};

/// One node of the accessibility tree reported by the device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    /// Platform bounds string, e.g. `[0,0][1080,200]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<String>,
    #[serde(default)]
    pub clickable: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ElementNode>,
}

impl ElementNode {
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn with_resource_id(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: Some(resource_id.into()),
            ..Self::default()
        }
    }

    pub fn child(mut self, child: ElementNode) -> Self {
        self.children.push(child);
        self
    }
}

/// Payload of `get_page_info`: what is in the foreground right now.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub package_name: String,
    #[serde(default, alias = "activity")]
    pub activity_name: Option<String>,
    #[serde(default, alias = "uiTree")]
    pub ui_tree: Option<ElementNode>,
}

impl PageInfo {
    pub fn new(package_name: impl Into<String>, activity_name: Option<&str>) -> Self {
        Self {
            package_name: package_name.into(),
            activity_name: activity_name.map(str::to_string),
            ui_tree: None,
        }
    }

    pub fn with_tree(mut self, tree: ElementNode) -> Self {
        self.ui_tree = Some(tree);
        self
    }
}

/// Reply of a single backend call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceResponse {
    pub success: bool,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl DeviceResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    pub fn ok_with(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Action names understood by the automation agent.
pub mod actions {
    pub const GET_PAGE_INFO: &str = "get_page_info";
    pub const CLICK_ELEMENT: &str = "click_element";
    pub const SET_INPUT_TEXT: &str = "set_input_text";
    pub const START_APP: &str = "start_app";
    pub const STOP_APP: &str = "stop_app";
    pub const SWIPE: &str = "swipe";
}
