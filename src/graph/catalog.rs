use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::graph::operation::Operation;

/// A named goal: reach `target_node`, then run `operation` there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub target_node: String,
    /// Application owning the target node.
    pub package_name: String,
    pub operation: Operation,
}

#[derive(Debug, Clone, Default)]
pub struct FunctionCatalog {
    functions: BTreeMap<String, FunctionDef>,
}

impl FunctionCatalog {
    /// Inserts `function`, replacing any previous entry of the same name.
    /// Returns the replaced entry.
    pub fn insert(&mut self, function: FunctionDef) -> Option<FunctionDef> {
        self.functions.insert(function.name.clone(), function)
    }

    pub fn get(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Functions of one application, or all of them.
    pub fn list(&self, package_name: Option<&str>) -> Vec<&FunctionDef> {
        self.functions
            .values()
            .filter(|f| package_name.map_or(true, |p| f.package_name == p))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn function(name: &str, package: &str, description: &str) -> FunctionDef {
        FunctionDef {
            name: name.into(),
            description: description.into(),
            target_node: "Home".into(),
            package_name: package.into(),
            operation: Operation::NoOp,
        }
    }

    #[test]
    fn later_insert_overrides() {
        let mut catalog = FunctionCatalog::default();
        assert!(catalog.insert(function("open", "a", "first")).is_none());
        let replaced = catalog.insert(function("open", "a", "second")).unwrap();
        assert_eq!(replaced.description, "first");
        assert_eq!(catalog.get("open").unwrap().description, "second");
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn list_filters_by_package() {
        let mut catalog = FunctionCatalog::default();
        catalog.insert(function("a1", "a", ""));
        catalog.insert(function("b1", "b", ""));
        assert_eq!(catalog.list(Some("a")).len(), 1);
        assert_eq!(catalog.list(None).len(), 2);
    }
}
