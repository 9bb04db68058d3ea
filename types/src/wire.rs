//! Engine wire records.
//!
//! Field names follow the engine's JSON (camelCase). Every array in a
//! response defaults to empty, and an explicit `null` is read as empty too,
//! so consumers never branch on presence.

use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};

use crate::rules::RuleToExecute;

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// Requests
// ============================================================================

/// Batch request written to the one-shot runner's stdin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRequest {
    pub filepaths: Vec<String>,
    pub tsconfig: Option<String>,
    pub rules: Vec<RuleToExecute>,
    /// Used for dependency lookup and logging; the engine never sees it.
    #[serde(skip)]
    pub project_root: PathBuf,
}

/// Single-file request sent to the persistent server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextualRequest {
    pub file: String,
    pub content: String,
    pub rules: Vec<RuleToExecute>,
}

// ============================================================================
// Responses
// ============================================================================

/// Engine output for one analyzed file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisResponse {
    pub filepath: String,
    #[serde(deserialize_with = "null_as_default")]
    pub issues: Vec<Issue>,
    #[serde(deserialize_with = "null_as_default")]
    pub highlights: Vec<Highlight>,
    #[serde(deserialize_with = "null_as_default")]
    pub symbols: Vec<Symbol>,
    #[serde(deserialize_with = "null_as_default")]
    pub cpd_tokens: Vec<CpdToken>,
    #[serde(deserialize_with = "null_as_default")]
    pub diagnostics: Vec<EngineDiagnostic>,
    #[serde(deserialize_with = "null_as_default")]
    pub ncloc: Vec<u32>,
    #[serde(deserialize_with = "null_as_default")]
    pub comment_lines: Vec<u32>,
    #[serde(deserialize_with = "null_as_default")]
    pub executable_lines: Vec<u32>,
    #[serde(deserialize_with = "null_as_default")]
    pub nosonar_lines: Vec<u32>,
    #[serde(deserialize_with = "null_as_default")]
    pub functions: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub classes: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub statements: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub complexity: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub cognitive_complexity: i64,
}

impl AnalysisResponse {
    /// A file with diagnostics failed to parse; everything else in the
    /// record is meaningless.
    #[must_use]
    pub fn has_diagnostics(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}

/// 0-based line, 0-based character.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub failure: String,
    #[serde(default)]
    pub start_position: Position,
    #[serde(default)]
    pub end_position: Position,
    /// Absolute path of the file the issue belongs to.
    pub name: String,
    pub rule_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub secondary_locations: Vec<SecondaryLocation>,
    #[serde(default)]
    pub cost: Option<f64>,
}

/// 0-based lines, like issue positions.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecondaryLocation {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
    #[serde(default)]
    pub message: Option<String>,
}

/// 1-based lines.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlight {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
    pub text_type: String,
}

/// 1-based lines.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpdToken {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
    pub image: String,
}

/// Declaration range plus every reference, 1-based lines.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Symbol {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub references: Vec<SymbolReference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolReference {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

/// Parse/compile error reported by the engine for one file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineDiagnostic {
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub col: u32,
    pub message: String,
}
