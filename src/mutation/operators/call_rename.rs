//! Rename a call to a sibling function, dropping arguments the sibling does not take.

use super::{named_call, renamed_call};
use crate::ast::{NodeId, SourceUnit};
use crate::mutation::operator::{MutationOperator, OperatorError};
use crate::mutation::Mutation;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameRule {
    pub target: String,
    /// Arguments past this count are dropped; `None` keeps them all.
    pub max_args: Option<usize>,
}

impl RenameRule {
    pub fn new(target: &str, max_args: Option<usize>) -> Self {
        Self {
            target: target.to_string(),
            max_args,
        }
    }
}

/// Replaces multibyte-aware string functions (and any configured pairs) with
/// their byte-oriented counterparts.
#[derive(Debug, Clone)]
pub struct CallRename {
    rules: BTreeMap<String, RenameRule>,
}

impl CallRename {
    pub const ID: &'static str = "call_rename";

    /// Function names are matched case-insensitively.
    pub fn new(rules: BTreeMap<String, RenameRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|(name, rule)| (name.to_lowercase(), rule))
            .collect();
        Self { rules }
    }

    pub fn default_rules() -> BTreeMap<String, RenameRule> {
        [
            ("mb_chr", "chr", Some(1)),
            ("mb_ord", "ord", Some(1)),
            ("mb_parse_str", "parse_str", None),
            ("mb_send_mail", "mail", None),
            ("mb_strcut", "substr", Some(3)),
            ("mb_stripos", "stripos", Some(3)),
            ("mb_stristr", "stristr", Some(3)),
            ("mb_strlen", "strlen", Some(1)),
            ("mb_strpos", "strpos", Some(3)),
            ("mb_strrchr", "strrchr", Some(2)),
            ("mb_strripos", "strripos", Some(3)),
            ("mb_strrpos", "strrpos", Some(3)),
            ("mb_strstr", "strstr", Some(3)),
            ("mb_strtolower", "strtolower", Some(1)),
            ("mb_strtoupper", "strtoupper", Some(1)),
            ("mb_substr_count", "substr_count", Some(2)),
            ("mb_substr", "substr", Some(3)),
        ]
        .into_iter()
        .map(|(from, to, max)| (from.to_string(), RenameRule::new(to, max)))
        .collect()
    }

    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    fn plan<'s, 'u>(
        &'s self,
        unit: &'u SourceUnit,
        node: NodeId,
    ) -> Option<(&'u str, &'s RenameRule, &'u [crate::ast::NodeRef])> {
        let (name, args) = named_call(unit, node)?;
        let rule = self.rules.get(&name.to_lowercase())?;
        Some((name, rule, args))
    }
}

impl Default for CallRename {
    fn default() -> Self {
        Self::new(Self::default_rules())
    }
}

impl MutationOperator for CallRename {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn handles(&self, unit: &SourceUnit, node: NodeId) -> bool {
        self.plan(unit, node).is_some()
    }

    fn expand(&self, unit: &SourceUnit, node: NodeId) -> Result<Vec<Mutation>, OperatorError> {
        let Some((name, rule, args)) = self.plan(unit, node) else {
            return Ok(Vec::new());
        };
        let kept = match rule.max_args {
            Some(max) => &args[..args.len().min(max)],
            None => args,
        };
        let description = format!("{}() -> {}()", name, rule.target);
        Ok(vec![Mutation::new(
            Self::ID,
            unit,
            node,
            renamed_call(&rule.target, kept),
            description,
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder::TreeBuilder;
    use crate::ast::{NodeKind, NodeRef};
    use crate::mutation::operators::test_support::mutate_all;

    fn call_unit(name: &str, arity: usize) -> (SourceUnit, NodeRef, Vec<NodeRef>) {
        let mut b = TreeBuilder::new();
        let mut args = vec![b.string("test")];
        for i in 1..arity {
            args.push(b.int(i as i64));
        }
        let call = b.call(name, args.clone());
        let stmt = b.expr_stmt(call);
        let root = b.unit(vec![stmt]);
        let unit = b.finish_with_prelude("a.php", "<?php\n\n", root).unwrap();
        (unit, call, args)
    }

    #[test]
    fn test_rename_and_truncate_to_configured_arity() {
        let rules = [("widen_length".to_string(), RenameRule::new("length", Some(1)))]
            .into_iter()
            .collect();
        let operator = CallRename::new(rules);
        let (unit, call, args) = call_unit("widen_length", 3);
        let call = call.base().unwrap();

        assert!(operator.handles(&unit, call));
        let mutations = operator.expand(&unit, call).unwrap();
        assert_eq!(mutations.len(), 1);

        let mutation = &mutations[0];
        assert_eq!(mutation.operator, "call_rename");
        assert_eq!(mutation.target, call);
        let root = mutation.replacement.roots[0];
        match &mutation.replacement.node(root).unwrap().kind {
            NodeKind::Call { callee, args: kept } => {
                assert_eq!(
                    mutation.replacement.node(*callee).unwrap().kind,
                    NodeKind::Name {
                        ident: "length".to_string()
                    }
                );
                assert_eq!(kept, &vec![args[0]]);
            }
            other => panic!("expected a call, got {:?}", other),
        }
    }

    #[test]
    fn test_mb_strlen_keeps_one_argument() {
        let (unit, _, _) = call_unit("mb_strlen", 2);
        let mutants = mutate_all(&CallRename::default(), &unit);
        assert_eq!(mutants, vec!["<?php\n\nstrlen('test');\n".to_string()]);
    }

    #[test]
    fn test_mb_substr_keeps_three_arguments() {
        let (unit, _, _) = call_unit("mb_substr", 4);
        let mutants = mutate_all(&CallRename::default(), &unit);
        assert_eq!(mutants, vec!["<?php\n\nsubstr('test', 1, 2);\n".to_string()]);
    }

    #[test]
    fn test_unlimited_rule_keeps_all_arguments() {
        let (unit, _, _) = call_unit("mb_parse_str", 2);
        let mutants = mutate_all(&CallRename::default(), &unit);
        assert_eq!(mutants, vec!["<?php\n\nparse_str('test', 1);\n".to_string()]);
    }

    #[test]
    fn test_name_match_is_case_insensitive() {
        let (unit, _, _) = call_unit("MB_STRTOUPPER", 1);
        let mutants = mutate_all(&CallRename::default(), &unit);
        assert_eq!(mutants, vec!["<?php\n\nstrtoupper('test');\n".to_string()]);
    }

    #[test]
    fn test_unknown_function_is_not_handled() {
        let (unit, call, _) = call_unit("strlen", 1);
        let operator = CallRename::default();
        assert!(!operator.handles(&unit, call.base().unwrap()));
        assert!(mutate_all(&operator, &unit).is_empty());
    }

    #[test]
    fn test_dynamic_callee_is_not_handled() {
        let mut b = TreeBuilder::new();
        let callee = b.var("$fn");
        let arg = b.string("x");
        let call = b.push(NodeKind::Call {
            callee,
            args: vec![arg],
        });
        let stmt = b.expr_stmt(call);
        let root = b.unit(vec![stmt]);
        let unit = b.finish("a.php", root).unwrap();

        assert!(mutate_all(&CallRename::default(), &unit).is_empty());
    }

    #[test]
    fn test_default_rule_table() {
        let rules = CallRename::default_rules();
        assert_eq!(rules.len(), 17);
        assert_eq!(rules["mb_strrchr"], RenameRule::new("strrchr", Some(2)));
        assert_eq!(rules["mb_send_mail"], RenameRule::new("mail", None));
    }
}
