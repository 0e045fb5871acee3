//! The mutation operator contract.

use super::Mutation;
use crate::ast::{NodeId, SourceUnit};
use std::collections::HashMap;

/// An operator broke its contract on a well-formed node. The enumerator drops
/// the node's mutations and keeps going.
#[derive(Debug, thiserror::Error)]
#[error("operator `{operator}` failed on {node_kind} node {node:?}: {reason}")]
pub struct OperatorError {
    pub operator: String,
    pub node: NodeId,
    pub node_kind: &'static str,
    pub reason: String,
}

/// A stateless rule that recognises a node shape and proposes replacements.
///
/// `handles` must be true exactly when `expand` yields at least one mutation,
/// and `expand` is only called for nodes the operator handles.
pub trait MutationOperator: Send + Sync {
    fn id(&self) -> &'static str;

    fn handles(&self, unit: &SourceUnit, node: NodeId) -> bool;

    fn expand(&self, unit: &SourceUnit, node: NodeId) -> Result<Vec<Mutation>, OperatorError>;
}

/// Named integer constants operators may resolve arguments through.
///
/// Passed to operators at construction so they never consult ambient state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstantTable {
    values: HashMap<String, i64>,
}

/// Case conversion modes understood by multibyte string functions.
pub const MB_CASE_CONSTANTS: &[(&str, i64)] = &[
    ("MB_CASE_UPPER", 0),
    ("MB_CASE_LOWER", 1),
    ("MB_CASE_TITLE", 2),
    ("MB_CASE_FOLD", 3),
    ("MB_CASE_UPPER_SIMPLE", 4),
    ("MB_CASE_LOWER_SIMPLE", 5),
    ("MB_CASE_TITLE_SIMPLE", 6),
    ("MB_CASE_FOLD_SIMPLE", 7),
];

impl ConstantTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        for (name, value) in MB_CASE_CONSTANTS {
            table.insert(name, *value);
        }
        table
    }

    pub fn insert(&mut self, name: &str, value: i64) {
        self.values.insert(name.to_string(), value);
    }

    pub fn extend<'a>(&mut self, entries: impl IntoIterator<Item = (&'a String, &'a i64)>) {
        for (name, value) in entries {
            self.insert(name, *value);
        }
    }

    /// Value of a constant, or `None` if it is not defined.
    pub fn resolve(&self, name: &str) -> Option<i64> {
        // Namespaced references resolve to the global constant.
        let name = name.trim_start_matches('\\');
        self.values.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_constants() {
        let table = ConstantTable::with_defaults();
        assert_eq!(table.resolve("MB_CASE_UPPER"), Some(0));
        assert_eq!(table.resolve("MB_CASE_FOLD_SIMPLE"), Some(7));
        assert_eq!(table.len(), 8);
    }

    #[test]
    fn test_resolve_unknown_constant() {
        let table = ConstantTable::with_defaults();
        assert_eq!(table.resolve("PHP_EOL"), None);
        assert_eq!(ConstantTable::new().resolve("MB_CASE_UPPER"), None);
    }

    #[test]
    fn test_resolve_fully_qualified_name() {
        let table = ConstantTable::with_defaults();
        assert_eq!(table.resolve("\\MB_CASE_LOWER"), Some(1));
    }

    #[test]
    fn test_extend_overrides() {
        let mut table = ConstantTable::with_defaults();
        let extra: std::collections::BTreeMap<String, i64> =
            [("MB_CASE_UPPER".to_string(), 42), ("MY_MODE".to_string(), 9)]
                .into_iter()
                .collect();
        table.extend(&extra);
        assert_eq!(table.resolve("MB_CASE_UPPER"), Some(42));
        assert_eq!(table.resolve("MY_MODE"), Some(9));
    }
}
