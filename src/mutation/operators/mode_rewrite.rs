//! Rewrite a mode-driven call to the dedicated function for that mode.

use super::{named_call, renamed_call};
use crate::ast::{Literal, NodeId, NodeKind, NodeRef, SourceUnit};
use crate::mutation::operator::{ConstantTable, MutationOperator, OperatorError};
use crate::mutation::Mutation;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeRule {
    /// Position of the mode argument.
    pub mode_arg: usize,
    /// Leading arguments carried over to the rewritten call.
    pub keep_args: usize,
    pub modes: BTreeMap<i64, String>,
}

impl ModeRule {
    pub fn new(mode_arg: usize, keep_args: usize, modes: BTreeMap<i64, String>) -> Self {
        Self {
            mode_arg,
            keep_args,
            modes,
        }
    }

    /// Build a mode table keyed by constant names. Returns the first name the
    /// table cannot resolve as the error.
    pub fn from_constants(
        mode_arg: usize,
        keep_args: usize,
        modes: &[(&str, &str)],
        constants: &ConstantTable,
    ) -> Result<Self, String> {
        let mut table = BTreeMap::new();
        for (name, target) in modes {
            let value = constants.resolve(name).ok_or_else(|| name.to_string())?;
            table.insert(value, target.to_string());
        }
        Ok(Self::new(mode_arg, keep_args, table))
    }
}

#[derive(Debug, Clone)]
pub struct ModeRewrite {
    rules: BTreeMap<String, ModeRule>,
    constants: ConstantTable,
}

impl ModeRewrite {
    pub const ID: &'static str = "mode_rewrite";

    pub fn new(rules: BTreeMap<String, ModeRule>, constants: ConstantTable) -> Self {
        let rules = rules
            .into_iter()
            .map(|(name, rule)| (name.to_lowercase(), rule))
            .collect();
        Self { rules, constants }
    }

    /// The `mb_convert_case` rule. Fails only when `constants` lacks one of
    /// the case-mode names.
    pub fn default_rules(constants: &ConstantTable) -> Result<BTreeMap<String, ModeRule>, String> {
        let convert_case = ModeRule::from_constants(
            1,
            1,
            &[
                ("MB_CASE_UPPER", "strtoupper"),
                ("MB_CASE_UPPER_SIMPLE", "strtoupper"),
                ("MB_CASE_LOWER", "strtolower"),
                ("MB_CASE_LOWER_SIMPLE", "strtolower"),
                ("MB_CASE_FOLD", "strtolower"),
                ("MB_CASE_FOLD_SIMPLE", "strtolower"),
                ("MB_CASE_TITLE", "ucwords"),
                ("MB_CASE_TITLE_SIMPLE", "ucwords"),
            ],
            constants,
        )?;
        Ok([("mb_convert_case".to_string(), convert_case)]
            .into_iter()
            .collect())
    }

    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    fn mode_value(&self, unit: &SourceUnit, arg: NodeRef) -> Option<i64> {
        let (_, node) = unit.tree.resolve(arg)?;
        match &node.kind {
            NodeKind::Literal {
                value: Literal::Int(value),
            } => Some(*value),
            NodeKind::Const { name } => self.constants.resolve(name),
            _ => None,
        }
    }

    fn plan<'s, 'u>(
        &'s self,
        unit: &'u SourceUnit,
        node: NodeId,
    ) -> Option<(&'u str, &'s str, &'u [NodeRef])> {
        let (name, args) = named_call(unit, node)?;
        let rule = self.rules.get(&name.to_lowercase())?;
        let mode = self.mode_value(unit, *args.get(rule.mode_arg)?)?;
        let target = rule.modes.get(&mode)?;
        let kept = &args[..args.len().min(rule.keep_args)];
        Some((name, target.as_str(), kept))
    }
}

impl MutationOperator for ModeRewrite {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn handles(&self, unit: &SourceUnit, node: NodeId) -> bool {
        self.plan(unit, node).is_some()
    }

    fn expand(&self, unit: &SourceUnit, node: NodeId) -> Result<Vec<Mutation>, OperatorError> {
        let Some((name, target, kept)) = self.plan(unit, node) else {
            return Ok(Vec::new());
        };
        Ok(vec![Mutation::new(
            Self::ID,
            unit,
            node,
            renamed_call(target, kept),
            format!("{}() -> {}()", name, target),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder::TreeBuilder;
    use crate::mutation::operators::test_support::mutate_all;

    fn default_operator() -> ModeRewrite {
        let constants = ConstantTable::with_defaults();
        let rules = ModeRewrite::default_rules(&constants).unwrap();
        ModeRewrite::new(rules, constants)
    }

    fn convert_case(mode: impl FnOnce(&mut TreeBuilder) -> NodeRef) -> SourceUnit {
        let mut b = TreeBuilder::new();
        let subject = b.string("test");
        let mode = mode(&mut b);
        let call = b.call("mb_convert_case", vec![subject, mode]);
        let stmt = b.expr_stmt(call);
        let root = b.unit(vec![stmt]);
        b.finish_with_prelude("a.php", "<?php\n\n", root).unwrap()
    }

    // =========================================================================
    // Literal and constant modes
    // =========================================================================

    #[test]
    fn test_literal_mode_rewrites_to_target() {
        let mut modes = BTreeMap::new();
        modes.insert(0, "to_upper".to_string());
        modes.insert(4, "to_upper".to_string());
        let rules = [("convert".to_string(), ModeRule::new(1, 1, modes))]
            .into_iter()
            .collect();
        let operator = ModeRewrite::new(rules, ConstantTable::new());

        let mut b = TreeBuilder::new();
        let subject = b.var("$s");
        let mode = b.int(4);
        let call = b.call("convert", vec![subject, mode]);
        let stmt = b.expr_stmt(call);
        let root = b.unit(vec![stmt]);
        let unit = b.finish("a.php", root).unwrap();

        let call = call.base().unwrap();
        assert!(operator.handles(&unit, call));
        let mutations = operator.expand(&unit, call).unwrap();
        assert_eq!(mutations.len(), 1);
        let root = mutations[0].replacement.roots[0];
        match &mutations[0].replacement.node(root).unwrap().kind {
            NodeKind::Call { callee, args } => {
                assert_eq!(
                    mutations[0].replacement.node(*callee).unwrap().kind,
                    NodeKind::Name {
                        ident: "to_upper".to_string()
                    }
                );
                assert_eq!(args, &vec![subject]);
            }
            other => panic!("expected a call, got {:?}", other),
        }
        assert_eq!(mutate_all(&operator, &unit), vec!["to_upper($s);\n".to_string()]);
    }

    #[test]
    fn test_variable_mode_yields_nothing() {
        let unit = convert_case(|b| b.var("$mode"));
        let operator = default_operator();
        assert!(mutate_all(&operator, &unit).is_empty());
    }

    #[test]
    fn test_constant_modes() {
        let cases = [
            ("MB_CASE_UPPER", "strtoupper"),
            ("MB_CASE_UPPER_SIMPLE", "strtoupper"),
            ("MB_CASE_LOWER", "strtolower"),
            ("MB_CASE_FOLD_SIMPLE", "strtolower"),
            ("MB_CASE_TITLE", "ucwords"),
            ("\\MB_CASE_TITLE_SIMPLE", "ucwords"),
        ];
        let operator = default_operator();
        for (constant, target) in cases {
            let unit = convert_case(|b| b.constant(constant));
            assert_eq!(
                mutate_all(&operator, &unit),
                vec![format!("<?php\n\n{}('test');\n", target)],
                "mode {}",
                constant
            );
        }
    }

    #[test]
    fn test_integer_mode_matches_constant_value() {
        let unit = convert_case(|b| b.int(2));
        assert_eq!(
            mutate_all(&default_operator(), &unit),
            vec!["<?php\n\nucwords('test');\n".to_string()]
        );
    }

    #[test]
    fn test_unmapped_or_unknown_mode_yields_nothing() {
        let operator = default_operator();
        assert!(mutate_all(&operator, &convert_case(|b| b.int(42))).is_empty());
        assert!(mutate_all(&operator, &convert_case(|b| b.constant("UNKNOWN_MODE"))).is_empty());
    }

    #[test]
    fn test_missing_mode_argument_yields_nothing() {
        let mut b = TreeBuilder::new();
        let subject = b.string("test");
        let call = b.call("mb_convert_case", vec![subject]);
        let stmt = b.expr_stmt(call);
        let root = b.unit(vec![stmt]);
        let unit = b.finish("a.php", root).unwrap();

        assert!(mutate_all(&default_operator(), &unit).is_empty());
    }

    #[test]
    fn test_default_rules_require_case_constants() {
        let err = ModeRewrite::default_rules(&ConstantTable::new()).unwrap_err();
        assert_eq!(err, "MB_CASE_UPPER");
    }
}
