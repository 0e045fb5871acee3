//! Mutation generation and outcome bookkeeping.
//!
//! This module provides:
//! - The operator contract and the built-in operators
//! - Enumeration of mutations over a baseline tree
//! - Materialization of mutants as copy-on-write overlays
//! - Classification of executed mutants and score aggregation

pub mod classifier;
pub mod enumerator;
pub mod ignore;
pub mod materializer;
pub mod operator;
pub mod operators;
pub mod registry;
pub mod score;

use crate::ast::{Node, NodeId, NodeRef, SourceUnit, Span};
use crate::coverage::TestId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Position of a mutation in the canonical enumeration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationId(pub usize);

/// Where a mutation applies in the original source.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Location {
    pub file: PathBuf,
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl Location {
    pub fn new(file: impl Into<PathBuf>, span: Option<Span>) -> Self {
        let span = span.unwrap_or_default();
        Self {
            file: file.into(),
            start_line: span.start.line,
            start_column: span.start.column,
            end_line: span.end.line,
            end_column: span.end.column,
        }
    }

    /// Lines touched by the mutation, or `None` when the node had no position.
    pub fn lines(&self) -> Option<std::ops::RangeInclusive<u32>> {
        if self.start_line == 0 {
            None
        } else {
            Some(self.start_line..=self.end_line.max(self.start_line))
        }
    }
}

/// The node(s) substituted for a mutation target.
///
/// `nodes` is a small arena: `Local(i)` inside it refers to `nodes[i]`, while
/// `Base` references keep baseline subtrees untouched (for example retained
/// call arguments).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Replacement {
    pub nodes: Vec<Node>,
    pub roots: Vec<NodeRef>,
}

impl Replacement {
    /// Remove the target without putting anything in its place.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Substitute a baseline node for the target.
    pub fn retained(id: NodeId) -> Self {
        Self {
            nodes: Vec::new(),
            roots: vec![NodeRef::Base(id)],
        }
    }

    /// Add a fresh node to the fragment and return a reference to it.
    pub fn push(&mut self, node: Node) -> NodeRef {
        self.nodes.push(node);
        NodeRef::Local((self.nodes.len() - 1) as u32)
    }

    pub fn with_root(mut self, root: NodeRef) -> Self {
        self.roots.push(root);
        self
    }

    pub fn node(&self, r: NodeRef) -> Option<&Node> {
        match r {
            NodeRef::Local(idx) => self.nodes.get(idx as usize),
            NodeRef::Base(_) => None,
        }
    }
}

/// One proposed change to the baseline tree.
#[derive(Debug, Clone, Serialize)]
pub struct Mutation {
    pub operator: String,
    pub target: NodeId,
    #[serde(skip)]
    pub replacement: Replacement,
    pub location: Location,
    pub description: String,
}

impl Mutation {
    pub fn new(
        operator: &str,
        unit: &SourceUnit,
        target: NodeId,
        replacement: Replacement,
        description: impl Into<String>,
    ) -> Self {
        let span = unit.tree.get(target).and_then(|n| n.span);
        Self {
            operator: operator.to_string(),
            target,
            replacement,
            location: Location::new(unit.path.clone(), span),
            description: description.into(),
        }
    }
}

/// Fate of a single mutant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutantOutcome {
    /// Inside a region excluded by configuration; never executed
    Ignored,
    /// No test covers the mutated lines; never executed
    NotCovered,
    /// Mutant could not be built or the test run could not be performed
    Error,
    /// Tests exceeded their deadline
    TimedOut,
    /// A covering test failed - mutation was caught
    Killed,
    /// All covering tests passed - mutation was NOT caught
    Escaped,
}

impl std::fmt::Display for MutantOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ignored => write!(f, "ignored"),
            Self::NotCovered => write!(f, "not_covered"),
            Self::Error => write!(f, "error"),
            Self::TimedOut => write!(f, "timed_out"),
            Self::Killed => write!(f, "killed"),
            Self::Escaped => write!(f, "escaped"),
        }
    }
}

/// Complete result of testing one mutant
#[derive(Debug, Clone, Serialize)]
pub struct MutantResult {
    pub id: MutationId,
    pub mutation: Mutation,
    pub outcome: MutantOutcome,
    pub tests: Vec<TestId>,
    pub killing_tests: Vec<TestId>,
    pub diff: String,
    pub execution_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    /// Earlier mutant with identical source whose outcome this one shares
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<MutationId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Position;

    #[test]
    fn test_mutant_outcome_display() {
        assert_eq!(MutantOutcome::Ignored.to_string(), "ignored");
        assert_eq!(MutantOutcome::NotCovered.to_string(), "not_covered");
        assert_eq!(MutantOutcome::Error.to_string(), "error");
        assert_eq!(MutantOutcome::TimedOut.to_string(), "timed_out");
        assert_eq!(MutantOutcome::Killed.to_string(), "killed");
        assert_eq!(MutantOutcome::Escaped.to_string(), "escaped");
    }

    #[test]
    fn test_location_lines() {
        let span = Span {
            start: Position {
                line: 3,
                column: 1,
                offset: 10,
            },
            end: Position {
                line: 5,
                column: 2,
                offset: 40,
            },
        };
        let location = Location::new("a.php", Some(span));
        assert_eq!(location.lines(), Some(3..=5));
        assert_eq!(Location::new("a.php", None).lines(), None);
    }

    #[test]
    fn test_replacement_push_returns_local_refs() {
        let mut replacement = Replacement::empty();
        let first = replacement.push(Node::fresh(crate::ast::NodeKind::Var {
            name: "x".to_string(),
        }));
        let second = replacement.push(Node::fresh(crate::ast::NodeKind::Var {
            name: "y".to_string(),
        }));
        assert_eq!(first, NodeRef::Local(0));
        assert_eq!(second, NodeRef::Local(1));
        assert!(replacement.node(second).is_some());
        assert!(replacement.node(NodeRef::Base(NodeId(0))).is_none());
    }
}
