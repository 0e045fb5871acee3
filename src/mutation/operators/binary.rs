//! Operator swaps on binary expressions. Each family is its own operator id.

use crate::ast::{BinaryOp, Node, NodeId, NodeKind, SourceUnit};
use crate::mutation::operator::{MutationOperator, OperatorError};
use crate::mutation::{Mutation, Replacement};

const ARITHMETIC_TABLE: &[(BinaryOp, BinaryOp)] = &[
    (BinaryOp::Add, BinaryOp::Sub),
    (BinaryOp::Sub, BinaryOp::Add),
    (BinaryOp::Mul, BinaryOp::Div),
    (BinaryOp::Div, BinaryOp::Mul),
    (BinaryOp::Rem, BinaryOp::Mul),
];

const RELATIONAL_BOUNDARY_TABLE: &[(BinaryOp, BinaryOp)] = &[
    (BinaryOp::Lt, BinaryOp::Le),
    (BinaryOp::Le, BinaryOp::Lt),
    (BinaryOp::Gt, BinaryOp::Ge),
    (BinaryOp::Ge, BinaryOp::Gt),
];

const RELATIONAL_NEGATION_TABLE: &[(BinaryOp, BinaryOp)] = &[
    (BinaryOp::Lt, BinaryOp::Ge),
    (BinaryOp::Le, BinaryOp::Gt),
    (BinaryOp::Gt, BinaryOp::Le),
    (BinaryOp::Ge, BinaryOp::Lt),
];

const EQUALITY_NEGATION_TABLE: &[(BinaryOp, BinaryOp)] = &[
    (BinaryOp::Eq, BinaryOp::Ne),
    (BinaryOp::Ne, BinaryOp::Eq),
    (BinaryOp::Identical, BinaryOp::NotIdentical),
    (BinaryOp::NotIdentical, BinaryOp::Identical),
];

const LOGICAL_FLIP_TABLE: &[(BinaryOp, BinaryOp)] = &[
    (BinaryOp::And, BinaryOp::Or),
    (BinaryOp::Or, BinaryOp::And),
];

/// Replaces the operator of a binary expression according to a fixed table,
/// keeping both operands.
#[derive(Debug, Clone)]
pub struct BinarySwap {
    id: &'static str,
    table: &'static [(BinaryOp, BinaryOp)],
}

impl BinarySwap {
    pub const ARITHMETIC: &'static str = "arithmetic";
    pub const RELATIONAL_BOUNDARY: &'static str = "relational_boundary";
    pub const RELATIONAL_NEGATION: &'static str = "relational_negation";
    pub const EQUALITY_NEGATION: &'static str = "equality_negation";
    pub const LOGICAL_FLIP: &'static str = "logical_flip";

    pub fn arithmetic() -> Self {
        Self {
            id: Self::ARITHMETIC,
            table: ARITHMETIC_TABLE,
        }
    }

    pub fn relational_boundary() -> Self {
        Self {
            id: Self::RELATIONAL_BOUNDARY,
            table: RELATIONAL_BOUNDARY_TABLE,
        }
    }

    pub fn relational_negation() -> Self {
        Self {
            id: Self::RELATIONAL_NEGATION,
            table: RELATIONAL_NEGATION_TABLE,
        }
    }

    pub fn equality_negation() -> Self {
        Self {
            id: Self::EQUALITY_NEGATION,
            table: EQUALITY_NEGATION_TABLE,
        }
    }

    pub fn logical_flip() -> Self {
        Self {
            id: Self::LOGICAL_FLIP,
            table: LOGICAL_FLIP_TABLE,
        }
    }

    fn swap_for(&self, op: BinaryOp) -> Option<BinaryOp> {
        self.table
            .iter()
            .find(|(from, _)| *from == op)
            .map(|(_, to)| *to)
    }
}

impl MutationOperator for BinarySwap {
    fn id(&self) -> &'static str {
        self.id
    }

    fn handles(&self, unit: &SourceUnit, node: NodeId) -> bool {
        match unit.tree.kind(node) {
            NodeKind::Binary { op, .. } => self.swap_for(*op).is_some(),
            _ => false,
        }
    }

    fn expand(&self, unit: &SourceUnit, node: NodeId) -> Result<Vec<Mutation>, OperatorError> {
        let NodeKind::Binary { op, lhs, rhs } = unit.tree.kind(node) else {
            return Ok(Vec::new());
        };
        let Some(swapped) = self.swap_for(*op) else {
            return Ok(Vec::new());
        };

        let mut replacement = Replacement::empty();
        let binary = replacement.push(Node::fresh(NodeKind::Binary {
            op: swapped,
            lhs: *lhs,
            rhs: *rhs,
        }));
        Ok(vec![Mutation::new(
            self.id,
            unit,
            node,
            replacement.with_root(binary),
            format!("{} -> {}", op.symbol(), swapped.symbol()),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder::TreeBuilder;
    use crate::mutation::operators::test_support::mutate_all;

    fn expression(op: BinaryOp) -> SourceUnit {
        let mut b = TreeBuilder::new();
        let a = b.var("$a");
        let c = b.var("$b");
        let expr = b.binary(op, a, c);
        let ret = b.ret(Some(expr));
        let root = b.unit(vec![ret]);
        b.finish("a.php", root).unwrap()
    }

    fn mutants(operator: BinarySwap, op: BinaryOp) -> Vec<String> {
        mutate_all(&operator, &expression(op))
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(mutants(BinarySwap::arithmetic(), BinaryOp::Add), vec!["return $a - $b;\n"]);
        assert_eq!(mutants(BinarySwap::arithmetic(), BinaryOp::Div), vec!["return $a * $b;\n"]);
        assert_eq!(mutants(BinarySwap::arithmetic(), BinaryOp::Rem), vec!["return $a * $b;\n"]);
        assert!(mutants(BinarySwap::arithmetic(), BinaryOp::Concat).is_empty());
    }

    #[test]
    fn test_relational() {
        assert_eq!(
            mutants(BinarySwap::relational_boundary(), BinaryOp::Lt),
            vec!["return $a <= $b;\n"]
        );
        assert_eq!(
            mutants(BinarySwap::relational_negation(), BinaryOp::Lt),
            vec!["return $a >= $b;\n"]
        );
        assert_eq!(
            mutants(BinarySwap::relational_negation(), BinaryOp::Ge),
            vec!["return $a < $b;\n"]
        );
        assert!(mutants(BinarySwap::relational_boundary(), BinaryOp::Eq).is_empty());
    }

    #[test]
    fn test_equality_and_logical() {
        assert_eq!(
            mutants(BinarySwap::equality_negation(), BinaryOp::Identical),
            vec!["return $a !== $b;\n"]
        );
        assert_eq!(mutants(BinarySwap::logical_flip(), BinaryOp::Or), vec!["return $a && $b;\n"]);
        assert!(mutants(BinarySwap::logical_flip(), BinaryOp::Coalesce).is_empty());
    }

    #[test]
    fn test_nested_operands_keep_grouping() {
        let mut b = TreeBuilder::new();
        let a = b.var("$a");
        let c = b.var("$b");
        let sum = b.binary(BinaryOp::Add, a, c);
        let two = b.int(2);
        let product = b.binary(BinaryOp::Mul, sum, two);
        let ret = b.ret(Some(product));
        let root = b.unit(vec![ret]);
        let unit = b.finish("a.php", root).unwrap();
        assert_eq!(unit.source, "return ($a + $b) * 2;\n");

        assert_eq!(
            mutate_all(&BinarySwap::arithmetic(), &unit),
            vec![
                "return ($a + $b) / 2;\n".to_string(),
                "return ($a - $b) * 2;\n".to_string(),
            ]
        );
    }
}
