//! Unwrap logical negation.

use crate::ast::{NodeId, NodeKind, SourceUnit, UnaryOp};
use crate::mutation::operator::{MutationOperator, OperatorError};
use crate::mutation::{Mutation, Replacement};

/// `!x` becomes `x`. Only atomic operands are unwrapped; removing the
/// negation in front of a compound expression would change its grouping.
#[derive(Debug, Clone, Default)]
pub struct NotRemoval;

impl NotRemoval {
    pub const ID: &'static str = "not_removal";

    fn plan(&self, unit: &SourceUnit, node: NodeId) -> Option<NodeId> {
        let NodeKind::Unary {
            op: UnaryOp::Not,
            operand,
        } = unit.tree.kind(node)
        else {
            return None;
        };
        let (operand, operand_node) = unit.tree.resolve(*operand)?;
        match operand_node.kind {
            NodeKind::Var { .. }
            | NodeKind::Call { .. }
            | NodeKind::Const { .. }
            | NodeKind::Literal { .. } => Some(operand),
            _ => None,
        }
    }
}

impl MutationOperator for NotRemoval {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn handles(&self, unit: &SourceUnit, node: NodeId) -> bool {
        self.plan(unit, node).is_some()
    }

    fn expand(&self, unit: &SourceUnit, node: NodeId) -> Result<Vec<Mutation>, OperatorError> {
        let Some(operand) = self.plan(unit, node) else {
            return Ok(Vec::new());
        };
        Ok(vec![Mutation::new(
            Self::ID,
            unit,
            node,
            Replacement::retained(operand),
            "remove !",
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
    fn test_remove_negation() {
        let mut b = TreeBuilder::new();
        let arg = b.var("$x");
        let call = b.call("is_ready", vec![arg]);
        let not = b.unary(UnaryOp::Not, call);
        let ret = b.ret(Some(not));
        let root = b.unit(vec![ret]);
        let unit = b.finish("a.php", root).unwrap();
        assert_eq!(unit.source, "return !is_ready($x);\n");

        assert_eq!(
            mutate_all(&NotRemoval, &unit),
            vec!["return is_ready($x);\n".to_string()]
        );
    }

    #[test]
    fn test_compound_operand_and_negation_untouched() {
        let mut b = TreeBuilder::new();
        let a = b.var("$a");
        let c = b.var("$b");
        let and = b.binary(BinaryOp::And, a, c);
        let not = b.unary(UnaryOp::Not, and);
        let d = b.var("$d");
        let neg = b.unary(UnaryOp::Neg, d);
        let s1 = b.expr_stmt(not);
        let s2 = b.expr_stmt(neg);
        let root = b.unit(vec![s1, s2]);
        let unit = b.finish("a.php", root).unwrap();

        assert!(mutate_all(&NotRemoval, &unit).is_empty());
    }
}
