//! Pin an `if` condition to a constant.

use super::boolean::{bool_literal, bool_value};
use crate::ast::{NodeId, NodeKind, SourceUnit};
use crate::mutation::operator::{MutationOperator, OperatorError};
use crate::mutation::Mutation;

/// Forces an `if` down one branch by replacing its condition: `false` always,
/// and `true` as well when there is an else branch to skip.
#[derive(Debug, Clone, Default)]
pub struct BranchRemoval;

impl BranchRemoval {
    pub const ID: &'static str = "branch_removal";

    /// Condition node and the constant values it can be pinned to.
    fn plan(&self, unit: &SourceUnit, node: NodeId) -> Option<(NodeId, Vec<bool>)> {
        let NodeKind::If {
            cond, else_branch, ..
        } = unit.tree.kind(node)
        else {
            return None;
        };
        let cond = cond.base()?;
        let current = bool_value(unit.tree.kind(cond));

        let mut values = vec![false];
        if else_branch.is_some() {
            values.push(true);
        }
        values.retain(|v| Some(*v) != current);

        if values.is_empty() {
            None
        } else {
            Some((cond, values))
        }
    }
}

impl MutationOperator for BranchRemoval {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn handles(&self, unit: &SourceUnit, node: NodeId) -> bool {
        self.plan(unit, node).is_some()
    }

    fn expand(&self, unit: &SourceUnit, node: NodeId) -> Result<Vec<Mutation>, OperatorError> {
        let Some((cond, values)) = self.plan(unit, node) else {
            return Ok(Vec::new());
        };
        Ok(values
            .into_iter()
            .map(|value| {
                Mutation::new(
                    Self::ID,
                    unit,
                    cond,
                    bool_literal(value),
                    format!("if condition -> {}", value),
                )
            })
            .collect())
    }
}
