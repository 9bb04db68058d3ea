//! Rule configuration payloads sent to the engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One rule parameter.
///
/// Engine rules take heterogeneous parameter lists (numbers, strings, flags,
/// nested lists). Keeping them as a closed enum means the encoder is
/// exhaustive; the untagged representation makes them plain JSON on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleArgument {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<RuleArgument>),
    Map(BTreeMap<String, RuleArgument>),
}

impl From<bool> for RuleArgument {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for RuleArgument {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for RuleArgument {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for RuleArgument {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// An enabled rule as the engine sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleToExecute {
    pub rule_name: String,
    pub rule_arguments: Vec<RuleArgument>,
}

impl RuleToExecute {
    #[must_use]
    pub fn new(rule_name: impl Into<String>, rule_arguments: Vec<RuleArgument>) -> Self {
        Self {
            rule_name: rule_name.into(),
            rule_arguments,
        }
    }
}
