//! Flip boolean literals and `true`/`false` constant fetches.

use crate::ast::{Literal, Node, NodeId, NodeKind, SourceUnit};
use crate::mutation::operator::{MutationOperator, OperatorError};
use crate::mutation::{Mutation, Replacement};

/// Truth value of a boolean literal or a `true`/`false` constant fetch.
pub(crate) fn bool_value(kind: &NodeKind) -> Option<bool> {
    match kind {
        NodeKind::Literal {
            value: Literal::Bool(value),
        } => Some(*value),
        NodeKind::Const { name } => {
            let name = name.trim_start_matches('\\');
            if name.eq_ignore_ascii_case("true") {
                Some(true)
            } else if name.eq_ignore_ascii_case("false") {
                Some(false)
            } else {
                None
            }
        }
        _ => None,
    }
}

pub(crate) fn bool_literal(value: bool) -> Replacement {
    let mut replacement = Replacement::empty();
    let node = replacement.push(Node::fresh(NodeKind::Literal {
        value: Literal::Bool(value),
    }));
    replacement.with_root(node)
}

/// `true` <-> `false`.
#[derive(Debug, Clone, Default)]
pub struct BooleanFlip;

impl BooleanFlip {
    pub const ID: &'static str = "boolean_flip";
}

impl MutationOperator for BooleanFlip {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn handles(&self, unit: &SourceUnit, node: NodeId) -> bool {
        bool_value(unit.tree.kind(node)).is_some()
    }

    fn expand(&self, unit: &SourceUnit, node: NodeId) -> Result<Vec<Mutation>, OperatorError> {
        let Some(value) = bool_value(unit.tree.kind(node)) else {
            return Ok(Vec::new());
        };
        Ok(vec![Mutation::new(
            Self::ID,
            unit,
            node,
            bool_literal(!value),
            format!("{} -> {}", value, !value),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder::TreeBuilder;
    use crate::mutation::operators::test_support::mutate_all;

    #[test]
    fn test_flip_literals_and_constants() {
        let mut b = TreeBuilder::new();
        let t = b.boolean(true);
        let f = b.constant("FALSE");
        let call = b.call("check", vec![t, f]);
        let stmt = b.expr_stmt(call);
        let root = b.unit(vec![stmt]);
        let unit = b.finish("a.php", root).unwrap();

        assert_eq!(
            mutate_all(&BooleanFlip, &unit),
            vec![
                "check(false, FALSE);\n".to_string(),
                "check(true, true);\n".to_string(),
            ]
        );
    }

    #[test]
    fn test_other_constants_are_ignored() {
        let mut b = TreeBuilder::new();
        let c = b.constant("PHP_EOL");
        let stmt = b.expr_stmt(c);
        let root = b.unit(vec![stmt]);
        let unit = b.finish("a.php", root).unwrap();

        assert!(mutate_all(&BooleanFlip, &unit).is_empty());
    }

    #[test]
    fn test_bool_value() {
        assert_eq!(bool_value(&NodeKind::Const { name: "\\True".to_string() }), Some(true));
        assert_eq!(bool_value(&NodeKind::Literal { value: Literal::Int(1) }), None);
    }
}
