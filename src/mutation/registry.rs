//! The active operator set, fixed once configuration has been read.

use super::operator::{ConstantTable, MutationOperator};
use super::operators::{
    AssignCoalesce, BinarySwap, BooleanFlip, BranchRemoval, CallRename, ModeRewrite, ModeRule,
    NotRemoval, RenameRule,
};
use crate::ast::{NodeId, SourceUnit};
use crate::config::{ConfigError, OperatorOptions, OperatorSetting};
use std::collections::BTreeMap;
use tracing::debug;

/// Built-in operator ids in registry order.
pub const BUILTIN_OPERATORS: &[&str] = &[
    CallRename::ID,
    ModeRewrite::ID,
    BooleanFlip::ID,
    BranchRemoval::ID,
    AssignCoalesce::ID,
    BinarySwap::ARITHMETIC,
    BinarySwap::RELATIONAL_BOUNDARY,
    BinarySwap::RELATIONAL_NEGATION,
    BinarySwap::EQUALITY_NEGATION,
    BinarySwap::LOGICAL_FLIP,
    NotRemoval::ID,
];

/// Immutable after construction: an operator disabled here never takes part
/// in enumeration.
pub struct OperatorRegistry {
    operators: Vec<Box<dyn MutationOperator>>,
}

impl OperatorRegistry {
    /// Build the registry from `[operators]` settings. Every built-in
    /// operator is enabled unless switched off; referencing an unknown
    /// operator or sub-rule fails.
    pub fn from_settings(
        settings: &BTreeMap<String, OperatorSetting>,
        constants: &ConstantTable,
    ) -> Result<Self, ConfigError> {
        if let Some(unknown) = settings
            .keys()
            .find(|id| !BUILTIN_OPERATORS.contains(&id.as_str()))
        {
            return Err(ConfigError::UnknownOperator(unknown.clone()));
        }

        let mut operators = Vec::new();
        for id in BUILTIN_OPERATORS {
            let setting = settings.get(*id);
            // Built even when disabled so that bad sub-rules are still reported.
            let operator =
                build_operator(id, setting.and_then(OperatorSetting::options), constants)?;
            if setting.map_or(true, OperatorSetting::enabled) {
                operators.push(operator);
            } else {
                debug!(operator = *id, "Operator disabled by configuration");
            }
        }

        Ok(Self { operators })
    }

    /// All built-in operators with their default rules.
    pub fn with_defaults() -> Result<Self, ConfigError> {
        Self::from_settings(&BTreeMap::new(), &ConstantTable::with_defaults())
    }

    pub fn with_operators(operators: Vec<Box<dyn MutationOperator>>) -> Self {
        Self { operators }
    }

    pub fn operators(&self) -> &[Box<dyn MutationOperator>] {
        &self.operators
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.operators.iter().map(|op| op.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Operators that handle `node`, in registry order.
    pub fn applicable<'a>(
        &'a self,
        unit: &'a SourceUnit,
        node: NodeId,
    ) -> impl Iterator<Item = &'a dyn MutationOperator> + 'a {
        self.operators
            .iter()
            .map(|op| -> &'a dyn MutationOperator { op.as_ref() })
            .filter(move |op| op.handles(unit, node))
    }
}

fn build_operator(
    id: &str,
    options: Option<&OperatorOptions>,
    constants: &ConstantTable,
) -> Result<Box<dyn MutationOperator>, ConfigError> {
    let unknown_rule = |rule: &str| ConfigError::UnknownRule {
        operator: id.to_string(),
        rule: rule.to_string(),
    };

    match id {
        CallRename::ID => {
            let mut rules = CallRename::default_rules();
            if let Some(options) = options {
                if let Some(name) = options.modes.keys().next() {
                    return Err(unknown_rule(name.as_str()));
                }
                for (name, setting) in &options.renames {
                    rules.insert(
                        name.to_lowercase(),
                        RenameRule::new(&setting.target, setting.max_args),
                    );
                }
                apply_toggles(id, &mut rules, &options.rules)?;
            }
            Ok(Box::new(CallRename::new(rules)))
        }
        ModeRewrite::ID => {
            let mut rules =
                ModeRewrite::default_rules(constants).map_err(|name| ConfigError::UnknownConstant {
                    operator: id.to_string(),
                    rule: "mb_convert_case".to_string(),
                    name,
                })?;
            if let Some(options) = options {
                if let Some(name) = options.renames.keys().next() {
                    return Err(unknown_rule(name.as_str()));
                }
                for (name, setting) in &options.modes {
                    let mut modes = BTreeMap::new();
                    for (mode, target) in &setting.modes {
                        let value = mode
                            .parse::<i64>()
                            .ok()
                            .or_else(|| constants.resolve(mode))
                            .ok_or_else(|| ConfigError::UnknownConstant {
                                operator: id.to_string(),
                                rule: name.clone(),
                                name: mode.clone(),
                            })?;
                        modes.insert(value, target.clone());
                    }
                    rules.insert(
                        name.to_lowercase(),
                        ModeRule::new(setting.mode_arg, setting.keep_args, modes),
                    );
                }
                apply_toggles(id, &mut rules, &options.rules)?;
            }
            Ok(Box::new(ModeRewrite::new(rules, constants.clone())))
        }
        _ => {
            if let Some(options) = options {
                let stray = options
                    .rules
                    .keys()
                    .chain(options.renames.keys())
                    .chain(options.modes.keys())
                    .next();
                if let Some(name) = stray {
                    return Err(unknown_rule(name.as_str()));
                }
            }
            simple_operator(id).ok_or_else(|| ConfigError::UnknownOperator(id.to_string()))
        }
    }
}

fn simple_operator(id: &str) -> Option<Box<dyn MutationOperator>> {
    let operator: Box<dyn MutationOperator> = match id {
        BooleanFlip::ID => Box::new(BooleanFlip),
        BranchRemoval::ID => Box::new(BranchRemoval),
        AssignCoalesce::ID => Box::new(AssignCoalesce),
        BinarySwap::ARITHMETIC => Box::new(BinarySwap::arithmetic()),
        BinarySwap::RELATIONAL_BOUNDARY => Box::new(BinarySwap::relational_boundary()),
        BinarySwap::RELATIONAL_NEGATION => Box::new(BinarySwap::relational_negation()),
        BinarySwap::EQUALITY_NEGATION => Box::new(BinarySwap::equality_negation()),
        BinarySwap::LOGICAL_FLIP => Box::new(BinarySwap::logical_flip()),
        NotRemoval::ID => Box::new(NotRemoval),
        _ => return None,
    };
    Some(operator)
}

/// Switch off sub-rules set to `false`. Names must exist in `rules`.
fn apply_toggles<V>(
    operator: &str,
    rules: &mut BTreeMap<String, V>,
    toggles: &BTreeMap<String, bool>,
) -> Result<(), ConfigError> {
    for (name, enabled) in toggles {
        let key = name.to_lowercase();
        if !rules.contains_key(&key) {
            return Err(ConfigError::UnknownRule {
                operator: operator.to_string(),
                rule: name.clone(),
            });
        }
        if !enabled {
            debug!(operator, rule = %key, "Rule disabled by configuration");
            rules.remove(&key);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder::TreeBuilder;
    use crate::config::{ModeSetting, RenameSetting};

    fn detailed(options: OperatorOptions) -> OperatorSetting {
        OperatorSetting::Detailed(options)
    }

    fn options() -> OperatorOptions {
        OperatorOptions {
            enabled: true,
            rules: BTreeMap::new(),
            renames: BTreeMap::new(),
            modes: BTreeMap::new(),
        }
    }

    fn call_unit(name: &str) -> (SourceUnit, NodeId) {
        let mut b = TreeBuilder::new();
        let arg = b.string("x");
        let call = b.call(name, vec![arg]);
        let stmt = b.expr_stmt(call);
        let root = b.unit(vec![stmt]);
        (b.finish("a.php", root).unwrap(), call.base().unwrap())
    }

    // =========================================================================
    // Construction
    // =========================================================================

    #[test]
    fn test_defaults_enable_every_builtin() {
        let registry = OperatorRegistry::with_defaults().unwrap();
        assert_eq!(registry.ids(), BUILTIN_OPERATORS.to_vec());
        assert_eq!(registry.len(), 11);
    }

    #[test]
    fn test_disable_operator() {
        let settings = [
            ("logical_flip".to_string(), OperatorSetting::Enabled(false)),
            ("boolean_flip".to_string(), OperatorSetting::Enabled(true)),
        ]
        .into_iter()
        .collect();
        let registry =
            OperatorRegistry::from_settings(&settings, &ConstantTable::with_defaults()).unwrap();
        assert!(!registry.ids().contains(&"logical_flip"));
        assert!(registry.ids().contains(&"boolean_flip"));
        assert_eq!(registry.len(), 10);
    }

    #[test]
    fn test_unknown_operator_is_fatal() {
        let settings = [("no_such_operator".to_string(), OperatorSetting::Enabled(true))]
            .into_iter()
            .collect();
        let result = OperatorRegistry::from_settings(&settings, &ConstantTable::with_defaults());
        assert_eq!(
            result.err(),
            Some(ConfigError::UnknownOperator("no_such_operator".to_string()))
        );
    }

    #[test]
    fn test_unknown_rule_is_fatal_even_when_disabled() {
        let mut opts = options();
        opts.enabled = false;
        opts.rules.insert("mb_nothing".to_string(), false);
        let settings = [("call_rename".to_string(), detailed(opts))].into_iter().collect();

        let result = OperatorRegistry::from_settings(&settings, &ConstantTable::with_defaults());
        assert!(matches!(
            result,
            Err(ConfigError::UnknownRule { operator, rule }) if operator == "call_rename" && rule == "mb_nothing"
        ));
    }

    #[test]
    fn test_rules_on_simple_operator_are_rejected() {
        let mut opts = options();
        opts.rules.insert("anything".to_string(), true);
        let settings = [("arithmetic".to_string(), detailed(opts))].into_iter().collect();
        assert!(OperatorRegistry::from_settings(&settings, &ConstantTable::with_defaults()).is_err());
    }

    #[test]
    fn test_missing_case_constants_are_fatal() {
        let result = OperatorRegistry::from_settings(&BTreeMap::new(), &ConstantTable::new());
        assert!(matches!(result, Err(ConfigError::UnknownConstant { .. })));
    }

    // =========================================================================
    // Sub-rules
    // =========================================================================

    #[test]
    fn test_disabled_rule_no_longer_applies() {
        let (unit, call) = call_unit("mb_strlen");

        let registry = OperatorRegistry::with_defaults().unwrap();
        assert_eq!(
            registry.applicable(&unit, call).map(|op| op.id()).collect::<Vec<_>>(),
            vec!["call_rename"]
        );

        let mut opts = options();
        opts.rules.insert("MB_STRLEN".to_string(), false);
        let settings = [("call_rename".to_string(), detailed(opts))].into_iter().collect();
        let registry =
            OperatorRegistry::from_settings(&settings, &ConstantTable::with_defaults()).unwrap();
        assert_eq!(registry.applicable(&unit, call).count(), 0);

        let (unit, call) = call_unit("mb_strtoupper");
        assert_eq!(registry.applicable(&unit, call).count(), 1);
    }

    #[test]
    fn test_custom_rename_rule() {
        let mut opts = options();
        opts.renames.insert(
            "widen_length".to_string(),
            RenameSetting {
                target: "length".to_string(),
                max_args: Some(1),
            },
        );
        let settings = [("call_rename".to_string(), detailed(opts))].into_iter().collect();
        let registry =
            OperatorRegistry::from_settings(&settings, &ConstantTable::with_defaults()).unwrap();

        let (unit, call) = call_unit("widen_length");
        let ops: Vec<_> = registry.applicable(&unit, call).collect();
        assert_eq!(ops.len(), 1);
        let mutations = ops[0].expand(&unit, call).unwrap();
        assert_eq!(mutations[0].description, "widen_length() -> length()");
    }

    #[test]
    fn test_custom_mode_rule_resolves_config_constants() {
        let mut constants = ConstantTable::with_defaults();
        constants.insert("MY_UPPER", 9);

        let mut modes = BTreeMap::new();
        modes.insert("MY_UPPER".to_string(), "to_upper".to_string());
        modes.insert("3".to_string(), "to_lower".to_string());
        let mut opts = options();
        opts.modes.insert(
            "convert".to_string(),
            ModeSetting {
                mode_arg: 1,
                keep_args: 1,
                modes,
            },
        );
        let settings = [("mode_rewrite".to_string(), detailed(opts))].into_iter().collect();
        let registry = OperatorRegistry::from_settings(&settings, &constants).unwrap();

        let mut b = TreeBuilder::new();
        let subject = b.var("$s");
        let mode = b.constant("MY_UPPER");
        let call = b.call("convert", vec![subject, mode]);
        let stmt = b.expr_stmt(call);
        let root = b.unit(vec![stmt]);
        let unit = b.finish("a.php", root).unwrap();

        let call = call.base().unwrap();
        let ops: Vec<_> = registry.applicable(&unit, call).collect();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].id(), "mode_rewrite");
    }

    #[test]
    fn test_custom_mode_rule_with_unknown_constant() {
        let mut modes = BTreeMap::new();
        modes.insert("NOT_DEFINED".to_string(), "to_upper".to_string());
        let mut opts = options();
        opts.modes.insert(
            "convert".to_string(),
            ModeSetting {
                mode_arg: 1,
                keep_args: 1,
                modes,
            },
        );
        let settings = [("mode_rewrite".to_string(), detailed(opts))].into_iter().collect();
        let result = OperatorRegistry::from_settings(&settings, &ConstantTable::with_defaults());
        assert!(matches!(
            result,
            Err(ConfigError::UnknownConstant { name, .. }) if name == "NOT_DEFINED"
        ));
    }
}
