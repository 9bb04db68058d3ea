//! Built-in rule catalogue and per-run activation.
//!
//! Host rule keys (`S1438`) map one-to-one onto engine rule names
//! (`semicolon`). The engine only ever sees engine names; issues come back
//! under engine names and are mapped back here.

use std::collections::{BTreeMap, HashSet};

use lintbridge_types::{RuleArgument, RuleToExecute};

/// Default parameter in a form that can live in a `static`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultArgument {
    Bool(bool),
    Int(i64),
    Str(&'static str),
}

impl From<DefaultArgument> for RuleArgument {
    fn from(value: DefaultArgument) -> Self {
        match value {
            DefaultArgument::Bool(b) => Self::Bool(b),
            DefaultArgument::Int(i) => Self::Int(i),
            DefaultArgument::Str(s) => Self::Str(s.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleDefinition {
    pub key: &'static str,
    pub engine_key: &'static str,
    pub description: &'static str,
    pub default_arguments: &'static [DefaultArgument],
    pub active_by_default: bool,
}

pub const BUILTIN_RULES: &[RuleDefinition] = &[
    RuleDefinition {
        key: "S104",
        engine_key: "max-file-line-count",
        description: "Files should not have too many lines of code",
        default_arguments: &[DefaultArgument::Int(1000)],
        active_by_default: false,
    },
    RuleDefinition {
        key: "S107",
        engine_key: "parameters-max-number",
        description: "Functions should not have too many parameters",
        default_arguments: &[DefaultArgument::Int(7)],
        active_by_default: true,
    },
    RuleDefinition {
        key: "S113",
        engine_key: "eofline",
        description: "Files should contain an empty newline at the end",
        default_arguments: &[],
        active_by_default: false,
    },
    RuleDefinition {
        key: "S1438",
        engine_key: "semicolon",
        description: "Statements should end with semicolons",
        default_arguments: &[DefaultArgument::Str("always")],
        active_by_default: false,
    },
    RuleDefinition {
        key: "S1451",
        engine_key: "file-header",
        description: "Track lack of copyright and license headers",
        default_arguments: &[DefaultArgument::Str("")],
        active_by_default: false,
    },
    RuleDefinition {
        key: "S1764",
        engine_key: "no-identical-expressions",
        description: "Identical expressions should not be used on both sides of a binary operator",
        default_arguments: &[],
        active_by_default: true,
    },
    RuleDefinition {
        key: "S3776",
        engine_key: "cognitive-complexity",
        description: "Cognitive Complexity of functions should not be too high",
        default_arguments: &[DefaultArgument::Int(15)],
        active_by_default: true,
    },
    RuleDefinition {
        key: "S3923",
        engine_key: "no-all-duplicated-branches",
        description: "All branches in a conditional structure should not have exactly the same implementation",
        default_arguments: &[],
        active_by_default: true,
    },
];

/// User adjustments on top of the defaults, keyed by host rule key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleOverrides {
    pub enabled: Vec<String>,
    pub disabled: Vec<String>,
    pub arguments: BTreeMap<String, Vec<RuleArgument>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveRule {
    definition: &'static RuleDefinition,
    arguments: Vec<RuleArgument>,
}

impl ActiveRule {
    #[must_use]
    pub fn definition(&self) -> &'static RuleDefinition {
        self.definition
    }

    #[must_use]
    pub fn arguments(&self) -> &[RuleArgument] {
        &self.arguments
    }
}

/// The rules active for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleRegistry {
    active: Vec<ActiveRule>,
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::with_overrides(&RuleOverrides::default())
    }
}

impl RuleRegistry {
    /// Defaults adjusted by `overrides`.
    ///
    /// Unknown rule keys are logged and skipped. A key both enabled and
    /// disabled ends up disabled.
    #[must_use]
    pub fn with_overrides(overrides: &RuleOverrides) -> Self {
        for key in overrides
            .enabled
            .iter()
            .chain(&overrides.disabled)
            .chain(overrides.arguments.keys())
        {
            if find_definition(key).is_none() {
                tracing::warn!("Unknown rule key '{key}' in configuration, ignoring it");
            }
        }

        let enabled: HashSet<&str> = overrides.enabled.iter().map(String::as_str).collect();
        let disabled: HashSet<&str> = overrides.disabled.iter().map(String::as_str).collect();

        let active = BUILTIN_RULES
            .iter()
            .filter(|rule| {
                !disabled.contains(rule.key)
                    && (rule.active_by_default || enabled.contains(rule.key))
            })
            .map(|definition| ActiveRule {
                definition,
                arguments: overrides.arguments.get(definition.key).map_or_else(
                    || {
                        definition
                            .default_arguments
                            .iter()
                            .copied()
                            .map(RuleArgument::from)
                            .collect()
                    },
                    Clone::clone,
                ),
            })
            .collect();

        Self { active }
    }

    /// Every built-in rule, regardless of activation.
    #[must_use]
    pub fn all() -> Self {
        let overrides = RuleOverrides {
            enabled: BUILTIN_RULES.iter().map(|r| r.key.to_string()).collect(),
            ..RuleOverrides::default()
        };
        Self::with_overrides(&overrides)
    }

    #[must_use]
    pub fn active(&self) -> &[ActiveRule] {
        &self.active
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Engine payload for the active rules.
    #[must_use]
    pub fn rules_to_execute(&self) -> Vec<RuleToExecute> {
        self.active
            .iter()
            .map(|rule| RuleToExecute::new(rule.definition.engine_key, rule.arguments.clone()))
            .collect()
    }

    /// Map an engine rule name back to the host key, if it is active.
    #[must_use]
    pub fn rule_key_for_engine_key(&self, engine_key: &str) -> Option<&'static str> {
        self.active
            .iter()
            .find(|rule| rule.definition.engine_key == engine_key)
            .map(|rule| rule.definition.key)
    }
}

fn find_definition(key: &str) -> Option<&'static RuleDefinition> {
    BUILTIN_RULES.iter().find(|rule| rule.key == key)
}
