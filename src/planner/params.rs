use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::graph::operation::Operation;
use crate::graph::selector::Selector;
use crate::planner::plan::Parameter;

/// Upper bound on operations and selectors visited in one walk.
pub const MAX_VISITED: usize = 4096;

pub fn template_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{([^}]+)\}\}").expect("template pattern is valid"))
}

/// Distinct `{{name}}` tokens in `text`, in order of first appearance.
pub fn template_tokens(text: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for capture in template_pattern().captures_iter(text) {
        let name = capture[1].trim().to_string();
        if !name.is_empty() && !tokens.contains(&name) {
            tokens.push(name);
        }
    }
    tokens
}

/// Tokens in every selector value the executor substitutes: text and
/// content description, including inside compound selectors.
fn selector_tokens(selector: &Selector, visited: &mut usize) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut stack = vec![selector];
    while let Some(current) = stack.pop() {
        *visited += 1;
        if *visited > MAX_VISITED {
            tracing::warn!(limit = MAX_VISITED, "selector walk truncated");
            break;
        }
        match current {
            Selector::ByText { value } | Selector::ByContentDesc { value } => {
                tokens.extend(template_tokens(value));
            }
            Selector::Compound { selectors, .. } => stack.extend(selectors.iter().rev()),
            _ => {}
        }
    }
    tokens
}

fn add(found: &mut BTreeMap<String, Parameter>, parameter: Parameter) {
    found.entry(parameter.key.clone()).or_insert(parameter);
}

/// Parameters required by `operations`, deduplicated by key and sorted.
///
/// An Input contributes its text variable; any templated selector
/// contributes one parameter per token. Sequential operations are walked
/// with an explicit stack.
pub fn extract_parameters<'a, I>(operations: I) -> Vec<Parameter>
where
    I: IntoIterator<Item = &'a Operation>,
{
    let mut found: BTreeMap<String, Parameter> = BTreeMap::new();
    let mut stack: Vec<&Operation> = operations.into_iter().collect();
    stack.reverse();
    let mut visited = 0usize;

    while let Some(op) = stack.pop() {
        visited += 1;
        if visited > MAX_VISITED {
            tracing::warn!(limit = MAX_VISITED, "parameter walk truncated");
            break;
        }
        match op {
            Operation::Input {
                selector,
                text_variable_key,
                ..
            } => {
                add(
                    &mut found,
                    Parameter::required_string(
                        text_variable_key.clone(),
                        format!("Text to type ({})", op.description()),
                    ),
                );
                for token in selector_tokens(selector, &mut visited) {
                    add(
                        &mut found,
                        Parameter::required_string(token.clone(), format!("Value for {{{{{token}}}}}")),
                    );
                }
            }
            Operation::Click { selector, .. } => {
                for token in selector_tokens(selector, &mut visited) {
                    add(
                        &mut found,
                        Parameter::required_string(
                            token.clone(),
                            format!("Value for {{{{{token}}}}} ({})", op.description()),
                        ),
                    );
                }
            }
            Operation::Sequential { operations, .. } => {
                stack.extend(operations.iter().rev());
            }
            _ => {}
        }
    }

    found.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(parameters: &[Parameter]) -> Vec<&str> {
        parameters.iter().map(|p| p.key.as_str()).collect()
    }

    #[test]
    fn tokens_are_distinct_and_trimmed() {
        assert_eq!(
            template_tokens("{{ contact }} and {{contact}} then {{group}}"),
            vec!["contact", "group"]
        );
        assert!(template_tokens("no templates {here}").is_empty());
    }

    #[test]
    fn input_and_templated_click_yield_two_parameters() {
        let ops = vec![
            Operation::input(Selector::resource_id("msgBox"), "message"),
            Operation::click(Selector::text("{{contact}}")),
            Operation::click(Selector::text("Chat with {{contact}}")),
        ];
        let parameters = extract_parameters(&ops);
        assert_eq!(keys(&parameters), vec!["contact", "message"]);
        assert!(parameters.iter().all(|p| p.required));
    }

    #[test]
    fn walks_into_sequential_and_compound() {
        let op = Operation::Sequential {
            operations: vec![
                Operation::NoOp,
                Operation::Sequential {
                    operations: vec![Operation::click(Selector::Compound {
                        selectors: vec![
                            Selector::content_desc("{{label}}"),
                            Selector::resource_id("{{ignored}}"),
                        ],
                        operator: crate::graph::selector::LogicalOperator::Or,
                    })],
                    description: None,
                },
            ],
            description: None,
        };
        assert_eq!(keys(&extract_parameters([&op])), vec!["label"]);
    }

    #[test]
    fn other_kinds_contribute_nothing() {
        let ops = vec![
            Operation::launch_app("com.example"),
            Operation::NoOp,
            Operation::Wait {
                duration_ms: 10,
                description: Some("{{not_a_param}}".into()),
            },
        ];
        assert!(extract_parameters(&ops).is_empty());
    }
}
