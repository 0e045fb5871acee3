//! Built-in mutation operators.
//!
//! Every operator decides applicability and builds its replacements from the
//! same private plan, so `handles` and `expand` can never disagree.

pub mod assignment;
pub mod binary;
pub mod boolean;
pub mod branch;
pub mod call_rename;
pub mod mode_rewrite;
pub mod unary;

pub use assignment::AssignCoalesce;
pub use binary::BinarySwap;
pub use boolean::BooleanFlip;
pub use branch::BranchRemoval;
pub use call_rename::{CallRename, RenameRule};
pub use mode_rewrite::{ModeRewrite, ModeRule};
pub use unary::NotRemoval;

use super::Replacement;
use crate::ast::{Node, NodeId, NodeKind, NodeRef, SourceUnit};

/// Name and arguments of a call whose callee is a plain name. Calls through
/// variables or other expressions yield `None`.
pub(crate) fn named_call(unit: &SourceUnit, node: NodeId) -> Option<(&str, &[NodeRef])> {
    let NodeKind::Call { callee, args } = unit.tree.kind(node) else {
        return None;
    };
    let (_, callee) = unit.tree.resolve(*callee)?;
    match &callee.kind {
        NodeKind::Name { ident } => Some((ident.as_str(), args.as_slice())),
        _ => None,
    }
}

/// A call to `name` with the given (baseline) arguments.
pub(crate) fn renamed_call(name: &str, args: &[NodeRef]) -> Replacement {
    let mut replacement = Replacement::empty();
    let callee = replacement.push(Node::fresh(NodeKind::Name {
        ident: name.to_string(),
    }));
    let call = replacement.push(Node::fresh(NodeKind::Call {
        callee,
        args: args.to_vec(),
    }));
    replacement.with_root(call)
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::ast::printer::{Printer, SourcePrinter};
    use crate::ast::SourceUnit;
    use crate::mutation::materializer::materialize;
    use crate::mutation::operator::MutationOperator;

    /// Print every mutant an operator produces over the whole unit, in
    /// traversal order, checking the handles/expand agreement on the way.
    pub(crate) fn mutate_all(operator: &dyn MutationOperator, unit: &SourceUnit) -> Vec<String> {
        let mut mutants = Vec::new();
        for id in unit.tree.preorder() {
            let handles = operator.handles(unit, id);
            let expanded = if handles {
                operator.expand(unit, id).unwrap()
            } else {
                Vec::new()
            };
            assert_eq!(
                handles,
                !expanded.is_empty(),
                "handles() disagrees with expand() on node {:?}",
                id
            );
            for mutation in expanded {
                let mutant = materialize(unit, &mutation).unwrap();
                mutants.push(SourcePrinter.print(&mutant, unit).unwrap());
            }
        }
        mutants
    }
}
