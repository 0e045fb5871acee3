//! Turn a null-coalescing assignment into a plain one.

use crate::ast::{AssignOp, Node, NodeId, NodeKind, SourceUnit};
use crate::mutation::operator::{MutationOperator, OperatorError};
use crate::mutation::{Mutation, Replacement};

/// `$a ??= $b` becomes a plain assignment, so the existing value is always
/// overwritten.
#[derive(Debug, Clone, Default)]
pub struct AssignCoalesce;

impl AssignCoalesce {
    pub const ID: &'static str = "assign_coalesce";
}

impl MutationOperator for AssignCoalesce {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn handles(&self, unit: &SourceUnit, node: NodeId) -> bool {
        matches!(
            unit.tree.kind(node),
            NodeKind::Assign {
                op: AssignOp::Coalesce,
                ..
            }
        )
    }

    fn expand(&self, unit: &SourceUnit, node: NodeId) -> Result<Vec<Mutation>, OperatorError> {
        let NodeKind::Assign {
            op: AssignOp::Coalesce,
            target,
            value,
        } = unit.tree.kind(node)
        else {
            return Ok(Vec::new());
        };

        let mut replacement = Replacement::empty();
        let assign = replacement.push(Node::fresh(NodeKind::Assign {
            op: AssignOp::Plain,
            target: *target,
            value: *value,
        }));
        Ok(vec![Mutation::new(
            Self::ID,
            unit,
            node,
            replacement.with_root(assign),
            "??= -> =",
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder::TreeBuilder;
    use crate::ast::BinaryOp;
    use crate::mutation::operators::test_support::mutate_all;

    #[test]
    fn test_coalesce_assignment_becomes_plain() {
        let mut b = TreeBuilder::new();
        let target = b.var("$a");
        let value = b.string("value");
        let assign = b.assign(AssignOp::Coalesce, target, value);
        let stmt = b.expr_stmt(assign);
        let root = b.unit(vec![stmt]);
        let unit = b.finish_with_prelude("a.php", "<?php\n\n", root).unwrap();

        assert_eq!(
            mutate_all(&AssignCoalesce, &unit),
            vec!["<?php\n\n$a = 'value';\n".to_string()]
        );
    }

    #[test]
    fn test_other_assignments_and_coalesce_operator_untouched() {
        let mut b = TreeBuilder::new();
        let a = b.var("$a");
        let one = b.int(1);
        let plain = b.assign(AssignOp::Plain, a, one);
        let x = b.var("$x");
        let y = b.var("$y");
        let coalesce = b.binary(BinaryOp::Coalesce, x, y);
        let c = b.var("$c");
        let add = b.assign(AssignOp::Add, c, coalesce);
        let s1 = b.expr_stmt(plain);
        let s2 = b.expr_stmt(add);
        let root = b.unit(vec![s1, s2]);
        let unit = b.finish("a.php", root).unwrap();

        assert!(mutate_all(&AssignCoalesce, &unit).is_empty());
    }
}
