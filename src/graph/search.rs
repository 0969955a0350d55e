use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::operation::Operation;
use crate::state::{is_truthy, AbstractState, Variables};

#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub name: String,
    pub package_name: String,
    pub activity_name: Option<String>,
    pub variables: Variables,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathEdge {
    pub from: String,
    pub to: String,
    pub operation: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<Operation>,
    #[serde(default)]
    pub conditions: BTreeSet<String>,
    pub weight: f64,
    /// Inserted by the planner rather than declared in a document.
    #[serde(default)]
    pub synthetic: bool,
}

impl PathEdge {
    pub fn synthetic(from: impl Into<String>, to: impl Into<String>, operation: Operation, weight: f64) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            operation,
            validation: None,
            conditions: BTreeSet::new(),
            weight,
            synthetic: true,
        }
    }

    /// Every tag `k` needs a truthy `context[k]`; `!k` needs the opposite.
    pub fn allowed(&self, context: &Variables) -> bool {
        self.conditions.iter().all(|tag| match tag.strip_prefix('!') {
            Some(key) => !context.get(key).is_some_and(is_truthy),
            None => context.get(tag).is_some_and(is_truthy),
        })
    }
}

/// `states[i]` precedes `edges[i]`, which leads to `states[i + 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedPath {
    pub states: Vec<AbstractState>,
    pub edges: Vec<PathEdge>,
    pub total_weight: f64,
}

impl WeightedPath {
    pub fn single(state: AbstractState) -> Self {
        Self {
            states: vec![state],
            edges: Vec::new(),
            total_weight: 0.0,
        }
    }

    /// `None` only for a hand-built path without states.
    pub fn start(&self) -> Option<&AbstractState> {
        self.states.first()
    }

    pub fn end(&self) -> Option<&AbstractState> {
        self.states.last()
    }

    /// New path with `state --edge-->` in front of this one.
    pub fn prepend(self, state: AbstractState, edge: PathEdge) -> Self {
        let total_weight = edge.weight + self.total_weight;
        let mut states = Vec::with_capacity(self.states.len() + 1);
        states.push(state);
        states.extend(self.states);
        let mut edges = Vec::with_capacity(self.edges.len() + 1);
        edges.push(edge);
        edges.extend(self.edges);
        Self {
            states,
            edges,
            total_weight,
        }
    }

    pub fn append(mut self, edge: PathEdge, state: AbstractState) -> Self {
        self.total_weight += edge.weight;
        self.edges.push(edge);
        self.states.push(state);
        self
    }

    /// Every operation on the path, edge payloads first then validations.
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.edges
            .iter()
            .flat_map(|e| std::iter::once(&e.operation).chain(e.validation.iter()))
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SearchError {
    #[error("node '{0}' is not part of the graph")]
    UnknownNode(String),

    #[error("'{to}' is not reachable from '{from}'")]
    Unreachable { from: String, to: String },

    #[error("operation '{operation}' on edge {from} -> {to} cannot be applied")]
    Inapplicable {
        from: String,
        to: String,
        operation: String,
    },
}

/// Weighted directed graph over screen names, searched with Dijkstra.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: HashMap<String, GraphNode>,
    edges: Vec<PathEdge>,
    outgoing: HashMap<String, Vec<usize>>,
}

struct Frontier {
    cost: f64,
    node: String,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    // Reversed so the BinaryHeap pops the cheapest entry first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl Graph {
    pub fn add_node(&mut self, node: GraphNode) {
        self.outgoing.entry(node.name.clone()).or_default();
        self.nodes.insert(node.name.clone(), node);
    }

    /// Adds `edge`; returns false when either endpoint is missing.
    pub fn add_edge(&mut self, edge: PathEdge) -> bool {
        if !self.nodes.contains_key(&edge.from) || !self.nodes.contains_key(&edge.to) {
            return false;
        }
        self.outgoing
            .entry(edge.from.clone())
            .or_default()
            .push(self.edges.len());
        self.edges.push(edge);
        true
    }

    pub fn node(&self, name: &str) -> Option<&GraphNode> {
        self.nodes.get(name)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edges_from(&self, name: &str) -> impl Iterator<Item = &PathEdge> {
        self.outgoing
            .get(name)
            .into_iter()
            .flatten()
            .map(move |&i| &self.edges[i])
    }

    /// Planned state after arriving at `node` from `state`. Declared node
    /// variables are overridden by variables carried in from `state`.
    pub fn enter(&self, state: &AbstractState, node: &str) -> AbstractState {
        let Some(target) = self.nodes.get(node) else {
            let mut next = state.clone();
            next.state.id = node.to_string();
            return next;
        };
        let mut variables = target.variables.clone();
        variables.extend(
            state
                .variables()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        let mut next = AbstractState::new(
            target.name.clone(),
            Some(target.package_name.clone()),
            target.activity_name.clone(),
        );
        next.state.variables = variables;
        next
    }

    /// Cheapest route from `start`'s node to `target` using only edges whose
    /// preconditions hold in `context`.
    pub fn find_path(
        &self,
        start: &AbstractState,
        target: &str,
        context: &Variables,
    ) -> Result<WeightedPath, SearchError> {
        let source = start.node_id();
        if !self.nodes.contains_key(source) {
            return Err(SearchError::UnknownNode(source.to_string()));
        }
        if !self.nodes.contains_key(target) {
            return Err(SearchError::UnknownNode(target.to_string()));
        }

        let mut best: HashMap<&str, f64> = HashMap::new();
        let mut via: HashMap<&str, usize> = HashMap::new();
        let mut heap = BinaryHeap::new();
        best.insert(source, 0.0);
        heap.push(Frontier {
            cost: 0.0,
            node: source.to_string(),
        });

        while let Some(Frontier { cost, node }) = heap.pop() {
            if node == target {
                break;
            }
            if best.get(node.as_str()).is_some_and(|&known| cost > known) {
                continue;
            }
            for &index in self.outgoing.get(&node).into_iter().flatten() {
                let edge = &self.edges[index];
                if !edge.allowed(context) {
                    continue;
                }
                let next_cost = cost + edge.weight;
                let improves = best
                    .get(edge.to.as_str())
                    .map_or(true, |&known| next_cost < known);
                if improves {
                    best.insert(edge.to.as_str(), next_cost);
                    via.insert(edge.to.as_str(), index);
                    heap.push(Frontier {
                        cost: next_cost,
                        node: edge.to.clone(),
                    });
                }
            }
        }

        if source == target {
            return Ok(WeightedPath::single(start.clone()));
        }
        if !via.contains_key(target) {
            return Err(SearchError::Unreachable {
                from: source.to_string(),
                to: target.to_string(),
            });
        }

        let mut route = Vec::new();
        let mut cursor = target;
        while cursor != source {
            let index = via[cursor];
            route.push(index);
            cursor = self.edges[index].from.as_str();
        }
        route.reverse();
        self.realize(start, &route)
    }

    fn realize(&self, start: &AbstractState, route: &[usize]) -> Result<WeightedPath, SearchError> {
        let mut path = WeightedPath::single(start.clone());
        let mut current = start.clone();
        for &index in route {
            let edge = &self.edges[index];
            let applied = edge.operation.apply(&current).ok_or_else(|| SearchError::Inapplicable {
                from: edge.from.clone(),
                to: edge.to.clone(),
                operation: edge.operation.kind().to_string(),
            })?;
            current = self.enter(&applied, &edge.to);
            path = path.append(edge.clone(), current.clone());
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::operation::StatePredicate;
    use crate::graph::selector::Selector;
    use serde_json::json;

    fn node(name: &str) -> GraphNode {
        GraphNode {
            name: name.into(),
            package_name: "app".into(),
            activity_name: None,
            variables: Variables::new(),
        }
    }

    fn edge(from: &str, to: &str, weight: f64) -> PathEdge {
        PathEdge {
            from: from.into(),
            to: to.into(),
            operation: Operation::click(Selector::text(to)),
            validation: None,
            conditions: BTreeSet::new(),
            weight,
            synthetic: false,
        }
    }

    fn diamond() -> Graph {
        let mut graph = Graph::default();
        for name in ["A", "B", "C", "D"] {
            graph.add_node(node(name));
        }
        graph.add_edge(edge("A", "B", 1.0));
        graph.add_edge(edge("B", "D", 5.0));
        graph.add_edge(edge("A", "C", 2.0));
        graph.add_edge(edge("C", "D", 1.0));
        graph
    }

    #[test]
    fn picks_cheapest_route() {
        let graph = diamond();
        let start = AbstractState::new("A", Some("app".into()), None);
        let path = graph.find_path(&start, "D", &Variables::new()).unwrap();
        let visited: Vec<&str> = path.states.iter().map(|s| s.node_id()).collect();
        assert_eq!(visited, vec!["A", "C", "D"]);
        assert_eq!(path.total_weight, 3.0);
        assert_eq!(path.start(), Some(&start));
    }

    #[test]
    fn start_equal_to_target_is_empty_path() {
        let graph = diamond();
        let start = AbstractState::new("B", None, None);
        let path = graph.find_path(&start, "B", &Variables::new()).unwrap();
        assert!(path.edges.is_empty());
        assert_eq!(path.states.len(), 1);
    }

    #[test]
    fn unreachable_and_unknown_nodes_fail() {
        let graph = diamond();
        let start = AbstractState::new("D", None, None);
        assert!(matches!(
            graph.find_path(&start, "A", &Variables::new()),
            Err(SearchError::Unreachable { .. })
        ));
        let lost = AbstractState::new("Nowhere", None, None);
        assert_eq!(
            graph.find_path(&lost, "A", &Variables::new()),
            Err(SearchError::UnknownNode("Nowhere".into()))
        );
    }

    #[test]
    fn preconditions_gate_edges() {
        let mut graph = Graph::default();
        graph.add_node(node("A"));
        graph.add_node(node("B"));
        let mut gated = edge("A", "B", 1.0);
        gated.conditions.insert("logged_in".into());
        graph.add_edge(gated);

        let start = AbstractState::new("A", None, None);
        assert!(graph.find_path(&start, "B", &Variables::new()).is_err());

        let mut context = Variables::new();
        context.insert("logged_in".into(), json!(true));
        assert!(graph.find_path(&start, "B", &context).is_ok());
    }

    #[test]
    fn negated_precondition() {
        let mut gated = edge("A", "B", 1.0);
        gated.conditions.insert("!guest".into());
        assert!(gated.allowed(&Variables::new()));
        let mut context = Variables::new();
        context.insert("guest".into(), json!(true));
        assert!(!gated.allowed(&context));
    }

    #[test]
    fn entering_a_node_merges_declared_variables() {
        let mut graph = Graph::default();
        let mut declared = node("B");
        declared.variables.insert("tab".into(), json!("chats"));
        declared.variables.insert("user".into(), json!("declared"));
        graph.add_node(declared);

        let mut start = AbstractState::new("A", None, None);
        start.state.variables.insert("user".into(), json!("carried"));
        let next = graph.enter(&start, "B");
        assert_eq!(next.node_id(), "B");
        assert_eq!(next.package_name.as_deref(), Some("app"));
        assert_eq!(next.variable("tab"), Some(&json!("chats")));
        assert_eq!(next.variable("user"), Some(&json!("carried")));
    }

    #[test]
    fn inapplicable_operation_fails_realization() {
        let mut graph = Graph::default();
        graph.add_node(node("A"));
        graph.add_node(node("B"));
        let mut guarded = edge("A", "B", 1.0);
        guarded.operation = Operation::ValidateState {
            predicate: StatePredicate::VariablePresent { key: "token".into() },
            description: None,
        };
        graph.add_edge(guarded);

        let start = AbstractState::new("A", None, None);
        assert!(matches!(
            graph.find_path(&start, "B", &Variables::new()),
            Err(SearchError::Inapplicable { .. })
        ));
    }

    #[test]
    fn edges_need_both_endpoints() {
        let mut graph = Graph::default();
        graph.add_node(node("A"));
        assert!(!graph.add_edge(edge("A", "Missing", 1.0)));
        assert_eq!(graph.edge_count(), 0);
    }
}
