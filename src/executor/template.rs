use regex::Captures;

use crate::graph::operation::Operation;
use crate::graph::selector::Selector;
use crate::planner::params::template_pattern;
use crate::state::{value_to_string, Variables};

/// Deepest Sequential / Compound nesting rewritten; deeper parts pass through.
pub const MAX_DEPTH: usize = 32;

/// Replaces every `{{key}}` with `variables[key]`; unknown keys stay literal.
pub fn substitute_text(text: &str, variables: &Variables) -> String {
    template_pattern()
        .replace_all(text, |caps: &Captures| match variables.get(caps[1].trim()) {
            Some(value) => value_to_string(value),
            None => caps[0].to_string(),
        })
        .into_owned()
}

fn substitute_selector(selector: &Selector, variables: &Variables, depth: usize) -> Selector {
    match selector {
        Selector::ByText { value } => Selector::ByText {
            value: substitute_text(value, variables),
        },
        Selector::ByContentDesc { value } => Selector::ByContentDesc {
            value: substitute_text(value, variables),
        },
        Selector::Compound {
            selectors,
            operator,
        } if depth < MAX_DEPTH => Selector::Compound {
            selectors: selectors
                .iter()
                .map(|s| substitute_selector(s, variables, depth + 1))
                .collect(),
            operator: *operator,
        },
        other => other.clone(),
    }
}

/// Copy of `operation` with templated selectors filled from `variables`.
pub fn substitute(operation: &Operation, variables: &Variables) -> Operation {
    substitute_at(operation, variables, 0)
}

fn substitute_at(operation: &Operation, variables: &Variables, depth: usize) -> Operation {
    if depth >= MAX_DEPTH {
        tracing::warn!(limit = MAX_DEPTH, "template substitution depth limit reached");
        return operation.clone();
    }
    let mut next = operation.clone();
    match &mut next {
        Operation::Click { selector, .. }
        | Operation::Input { selector, .. }
        | Operation::ValidateElement { selector, .. } => {
            *selector = substitute_selector(selector, variables, depth + 1);
        }
        Operation::Sequential { operations, .. } => {
            for child in operations.iter_mut() {
                *child = substitute_at(child, variables, depth + 1);
            }
        }
        _ => {}
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(pairs: &[(&str, serde_json::Value)]) -> Variables {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn fills_known_and_keeps_unknown_tokens() {
        let variables = vars(&[("target", json!("Alice"))]);
        assert_eq!(substitute_text("{{target}}", &variables), "Alice");
        assert_eq!(
            substitute_text("Hi {{target}}, meet {{unknown}}", &variables),
            "Hi Alice, meet {{unknown}}"
        );
    }

    #[test]
    fn input_selector_is_rewritten() {
        let variables = vars(&[("target", json!("Alice"))]);
        let op = Operation::input(Selector::text("{{target}}"), "message");
        assert_eq!(
            substitute(&op, &variables),
            Operation::input(Selector::text("Alice"), "message")
        );
    }

    #[test]
    fn non_text_selectors_pass_through() {
        let variables = vars(&[("id", json!("send"))]);
        let op = Operation::click(Selector::resource_id("{{id}}"));
        assert_eq!(substitute(&op, &variables), op);
    }

    #[test]
    fn sequential_children_and_numbers() {
        let variables = vars(&[("count", json!(3)), ("who", json!("Bob"))]);
        let op = Operation::Sequential {
            operations: vec![
                Operation::click(Selector::content_desc("{{who}}")),
                Operation::click(Selector::text("{{count}} unread")),
            ],
            description: None,
        };
        let filled = substitute(&op, &variables);
        assert_eq!(filled.children()[0], Operation::click(Selector::content_desc("Bob")));
        assert_eq!(filled.children()[1], Operation::click(Selector::text("3 unread")));
    }
}
