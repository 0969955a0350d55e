use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::device::finder::find_element;
use crate::device::types::ElementNode;
use crate::graph::catalog::{FunctionCatalog, FunctionDef};
use crate::graph::document::{
    decode_entry, decode_operation, decode_selector, ConfigDocument, Diagnostics, EdgeDoc,
    FunctionDoc, NodeDoc,
};
use crate::graph::operation::Operation;
use crate::graph::search::{Graph, GraphNode, PathEdge};
use crate::graph::selector::Selector;
use crate::state::{Variables, UNKNOWN_NODE};

pub const DEFAULT_EDGE_WEIGHT: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Home,
    List,
    #[default]
    Detail,
    Dialog,
    Input,
    System,
}

impl NodeType {
    /// Accepts `HOME`, `home`, `Home`, `HOME_SCREEN` and similar spellings.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .chars()
            .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "home" | "homescreen" | "main" => Some(Self::Home),
            "list" => Some(Self::List),
            "detail" | "details" => Some(Self::Detail),
            "dialog" | "popup" => Some(Self::Dialog),
            "input" | "form" => Some(Self::Input),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenNode {
    pub name: String,
    pub description: String,
    pub package_name: String,
    pub activity_name: Option<String>,
    pub node_type: NodeType,
    pub match_selectors: Vec<Selector>,
    pub variables: Variables,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDefinition {
    pub from: String,
    pub to: String,
    /// Never empty.
    pub operations: Vec<Operation>,
    pub validation: Option<Operation>,
    pub conditions: BTreeSet<String>,
    pub weight: f64,
}

impl EdgeDefinition {
    /// Executable payload: the lone operation, or a Sequential of all of them.
    pub fn payload(&self) -> Option<Operation> {
        Operation::from_list(self.operations.clone())
    }
}

/// Outcome of loading one document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub package_name: String,
    pub nodes_added: usize,
    pub edges_added: usize,
    pub functions_added: usize,
    pub warnings: Vec<String>,
}

/// Immutable snapshot of every loaded screen, transition and function.
///
/// Loading produces a new snapshot; existing snapshots are never modified,
/// so plans built from one keep a consistent view.
#[derive(Debug, Clone, Default)]
pub struct ScreenGraph {
    nodes: Vec<ScreenNode>,
    node_index: HashMap<String, usize>,
    edges: Vec<EdgeDefinition>,
    functions: FunctionCatalog,
    graph: Graph,
}

impl ScreenGraph {
    pub fn from_document(doc: &ConfigDocument) -> (Self, LoadReport) {
        Self::default().load(doc, false)
    }

    /// Builds the snapshot that results from loading `doc`.
    ///
    /// Without `merge` the document replaces everything. With `merge`, nodes
    /// already present win, edges are always appended and functions of the
    /// new document replace same-named ones.
    pub fn load(&self, doc: &ConfigDocument, merge: bool) -> (Self, LoadReport) {
        let mut next = if merge {
            Self {
                nodes: self.nodes.clone(),
                node_index: self.node_index.clone(),
                edges: self.edges.clone(),
                functions: self.functions.clone(),
                graph: Graph::default(),
            }
        } else {
            Self::default()
        };
        let mut diag = Diagnostics::default();
        let mut report = LoadReport {
            package_name: doc.package_name.clone(),
            ..LoadReport::default()
        };

        for raw in &doc.nodes {
            let Some(node_doc) = decode_entry::<NodeDoc>(raw, "node", &mut diag) else {
                continue;
            };
            if next.node_index.contains_key(&node_doc.name) {
                tracing::debug!(node = %node_doc.name, "node already defined, keeping first definition");
                continue;
            }
            let node = build_node(node_doc, &doc.package_name, &mut diag);
            next.node_index.insert(node.name.clone(), next.nodes.len());
            next.nodes.push(node);
            report.nodes_added += 1;
        }

        for raw in &doc.edges {
            let Some(edge_doc) = decode_entry::<EdgeDoc>(raw, "edge", &mut diag) else {
                continue;
            };
            if let Some(edge) = next.build_edge(edge_doc, &mut diag) {
                next.edges.push(edge);
                report.edges_added += 1;
            }
        }

        for raw in &doc.functions {
            let Some(function_doc) = decode_entry::<FunctionDoc>(raw, "function", &mut diag) else {
                continue;
            };
            if let Some(function) = next.build_function(function_doc, &mut diag) {
                if next.functions.insert(function).is_some() {
                    tracing::debug!("function overridden by newer document");
                }
                report.functions_added += 1;
            }
        }

        next.rebuild();
        report.warnings = diag.warnings;
        tracing::info!(
            package = %report.package_name,
            merge,
            nodes = next.nodes.len(),
            edges = next.graph.edge_count(),
            functions = next.functions.len(),
            warnings = report.warnings.len(),
            "screen graph loaded"
        );
        (next, report)
    }

    fn build_edge(&self, doc: EdgeDoc, diag: &mut Diagnostics) -> Option<EdgeDefinition> {
        let label = format!("{} -> {}", doc.from, doc.to);
        for endpoint in [&doc.from, &doc.to] {
            if !self.node_index.contains_key(endpoint) {
                diag.warn(format!("edge {label} references unknown node '{endpoint}', dropped"));
                return None;
            }
        }

        let raw_operations = match (doc.operations, doc.operation) {
            (Some(list), _) => list,
            (None, Some(single)) => vec![single],
            (None, None) => Vec::new(),
        };
        let operations: Vec<Operation> = raw_operations
            .iter()
            .filter_map(|raw| decode_operation(raw, diag))
            .collect();
        if operations.is_empty() {
            diag.warn(format!("edge {label} has no valid operation, dropped"));
            return None;
        }

        let validation = doc
            .validation
            .as_ref()
            .and_then(|raw| decode_operation(raw, diag));

        let weight = match doc.weight {
            None => DEFAULT_EDGE_WEIGHT,
            Some(w) if w.is_finite() && w >= 0.0 => w,
            Some(w) => {
                diag.warn(format!("edge {label} has invalid weight {w}, using {DEFAULT_EDGE_WEIGHT}"));
                DEFAULT_EDGE_WEIGHT
            }
        };

        Some(EdgeDefinition {
            from: doc.from,
            to: doc.to,
            operations,
            validation,
            conditions: doc.conditions.into_iter().collect(),
            weight,
        })
    }

    fn build_function(&self, doc: FunctionDoc, diag: &mut Diagnostics) -> Option<FunctionDef> {
        let Some(target) = self.node(&doc.target_node_name) else {
            diag.warn(format!(
                "function '{}' targets unknown node '{}', dropped",
                doc.name, doc.target_node_name
            ));
            return None;
        };
        let operation = match &doc.operation {
            None => Operation::NoOp,
            Some(raw) => match decode_operation(raw, diag) {
                Some(op) => op,
                None => {
                    diag.warn(format!("function '{}' has an invalid operation, dropped", doc.name));
                    return None;
                }
            },
        };
        Some(FunctionDef {
            name: doc.name,
            description: doc.description,
            target_node: target.name.clone(),
            package_name: target.package_name.clone(),
            operation,
        })
    }

    /// Recompiles the search graph from the node and edge tables.
    fn rebuild(&mut self) {
        let mut graph = Graph::default();
        for node in &self.nodes {
            graph.add_node(GraphNode {
                name: node.name.clone(),
                package_name: node.package_name.clone(),
                activity_name: node.activity_name.clone(),
                variables: node.variables.clone(),
            });
        }
        for edge in &self.edges {
            let Some(operation) = edge.payload() else {
                continue;
            };
            graph.add_edge(PathEdge {
                from: edge.from.clone(),
                to: edge.to.clone(),
                operation,
                validation: edge.validation.clone(),
                conditions: edge.conditions.clone(),
                weight: edge.weight,
                synthetic: false,
            });
        }
        self.graph = graph;
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn node(&self, name: &str) -> Option<&ScreenNode> {
        self.node_index.get(name).map(|&i| &self.nodes[i])
    }

    pub fn nodes(&self) -> &[ScreenNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[EdgeDefinition] {
        &self.edges
    }

    pub fn functions(&self) -> &FunctionCatalog {
        &self.functions
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(name)
    }

    pub fn packages(&self) -> BTreeSet<&str> {
        self.nodes.iter().map(|n| n.package_name.as_str()).collect()
    }

    pub fn home_node(&self, package_name: &str) -> Option<&ScreenNode> {
        self.nodes
            .iter()
            .find(|n| n.package_name == package_name && n.node_type == NodeType::Home)
    }

    /// Names the node on screen: match selectors first, then package and
    /// activity, then the package's home node, else [`UNKNOWN_NODE`].
    pub fn identify(
        &self,
        package_name: &str,
        activity_name: Option<&str>,
        tree: Option<&ElementNode>,
    ) -> String {
        let in_package = || self.nodes.iter().filter(move |n| n.package_name == package_name);

        if let Some(tree) = tree {
            if let Some(node) = in_package().find(|n| {
                !n.match_selectors.is_empty()
                    && n.match_selectors
                        .iter()
                        .all(|s| find_element(tree, s).is_some())
            }) {
                return node.name.clone();
            }
        }

        if let Some(activity) = activity_name {
            if let Some(node) = in_package().find(|n| n.activity_name.as_deref() == Some(activity)) {
                return node.name.clone();
            }
        }

        self.home_node(package_name)
            .map(|n| n.name.clone())
            .unwrap_or_else(|| UNKNOWN_NODE.to_string())
    }
}

fn build_node(doc: NodeDoc, package_name: &str, diag: &mut Diagnostics) -> ScreenNode {
    let node_type = match doc.node_type.as_deref() {
        None => NodeType::default(),
        Some(raw) => NodeType::parse(raw).unwrap_or_else(|| {
            diag.warn(format!(
                "node '{}' has unknown nodeType '{raw}', treating it as detail",
                doc.name
            ));
            NodeType::default()
        }),
    };
    let match_selectors = doc
        .match_selectors
        .iter()
        .filter_map(|raw| decode_selector(raw, diag))
        .collect();
    ScreenNode {
        name: doc.name,
        description: doc.description,
        package_name: package_name.to_string(),
        activity_name: doc.activity_name,
        node_type,
        match_selectors,
        variables: doc.variables.into_iter().collect(),
    }
}
