//! Walks a unit once and collects every mutation the active operators propose.

use super::registry::OperatorRegistry;
use super::Mutation;
use crate::ast::SourceUnit;
use tracing::{debug, warn};

/// Mutations for one unit in canonical order: pre-order node traversal, then
/// registry order, then the order each operator yields them in.
///
/// An operator that fails on a node loses only that node's mutations.
pub fn enumerate(registry: &OperatorRegistry, unit: &SourceUnit) -> Vec<Mutation> {
    let mut mutations = Vec::new();

    for node in unit.tree.preorder() {
        for operator in registry.applicable(unit, node) {
            match operator.expand(unit, node) {
                Ok(expanded) => {
                    for mutation in expanded {
                        if unit.tree.get(mutation.target).is_none() {
                            warn!(
                                operator = operator.id(),
                                file = %unit.display_path(),
                                target = ?mutation.target,
                                "Dropping mutation targeting a node outside the tree"
                            );
                            continue;
                        }
                        mutations.push(mutation);
                    }
                }
                Err(e) => {
                    warn!(file = %unit.display_path(), "Skipping node: {}", e);
                }
            }
        }
    }

    debug!(
        file = %unit.display_path(),
        count = mutations.len(),
        "Enumerated mutations"
    );
    mutations
}
