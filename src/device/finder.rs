use crate::device::types::ElementNode;
use crate::graph::selector::Selector;

/// Depth-first, pre-order search for the first element matching `selector`.
///
/// Bounds, XPath and compound selectors need structural context a captured
/// tree does not carry and never match.
pub fn find_element<'a>(root: &'a ElementNode, selector: &Selector) -> Option<&'a ElementNode> {
    if !is_supported(selector) {
        return None;
    }
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if matches(node, selector) {
            return Some(node);
        }
        // Reverse so the leftmost child is visited first.
        stack.extend(node.children.iter().rev());
    }
    None
}

fn is_supported(selector: &Selector) -> bool {
    matches!(
        selector,
        Selector::ByText { .. }
            | Selector::ByResourceId { .. }
            | Selector::ByContentDesc { .. }
            | Selector::ByClassName { .. }
    )
}

fn contains_ignore_case(haystack: Option<&str>, needle: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(&needle.to_lowercase()))
}

pub fn matches(node: &ElementNode, selector: &Selector) -> bool {
    match selector {
        Selector::ByText { value } => contains_ignore_case(node.text.as_deref(), value),
        Selector::ByResourceId { value } => node
            .resource_id
            .as_deref()
            .is_some_and(|id| id.ends_with(value.as_str())),
        Selector::ByContentDesc { value } => contains_ignore_case(node.content_desc.as_deref(), value),
        Selector::ByClassName { value } => node.class_name.as_deref() == Some(value.as_str()),
        Selector::ByBounds { .. } | Selector::ByXPath { .. } | Selector::Compound { .. } => false,
    }
}
