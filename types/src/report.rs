//! Reporting contract between the runner and the host.
//!
//! The runner converts engine records into these host-side values and hands
//! them to an [`AnalysisReporter`]. Lines are 1-based, columns 0-based.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::files::FileRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TextRange {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl TextRange {
    #[must_use]
    pub fn new(start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> Self {
        Self {
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }
}

impl fmt::Display for TextRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.start_line, self.start_col, self.end_line, self.end_col
        )
    }
}

/// Syntax highlighting category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Keyword,
    KeywordLight,
    Comment,
    StructuredComment,
    String,
    Constant,
    Annotation,
    PreprocessDirective,
}

impl TokenType {
    /// Parse the engine's `textType` string, case-insensitively.
    ///
    /// Returns `None` for unknown types; the caller decides whether to skip.
    #[must_use]
    pub fn from_engine(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "keyword" => Some(Self::Keyword),
            "keyword_light" => Some(Self::KeywordLight),
            "comment" => Some(Self::Comment),
            "structured_comment" => Some(Self::StructuredComment),
            "string" => Some(Self::String),
            "constant" => Some(Self::Constant),
            "annotation" => Some(Self::Annotation),
            "preprocess_directive" => Some(Self::PreprocessDirective),
            _ => None,
        }
    }
}

/// Scalar per-file measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Ncloc,
    CommentLines,
    Functions,
    Classes,
    Statements,
    Complexity,
    CognitiveComplexity,
}

impl Metric {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Ncloc => "ncloc",
            Self::CommentLines => "comment_lines",
            Self::Functions => "functions",
            Self::Classes => "classes",
            Self::Statements => "statements",
            Self::Complexity => "complexity",
            Self::CognitiveComplexity => "cognitive_complexity",
        }
    }
}

/// Per-line measures (the set of lines carrying the property).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineMetric {
    NclocData,
    CommentLinesData,
    ExecutableLinesData,
}

/// Where an issue is anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum IssueLocation {
    /// Whole file (file-level rules).
    File,
    /// Whole line.
    Line { line: u32 },
    Range { range: TextRange },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecondaryReport {
    pub range: TextRange,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueReport {
    pub rule_key: String,
    pub primary: IssueLocation,
    pub secondary: Vec<SecondaryReport>,
    pub message: String,
    /// Remediation effort multiplier, when the rule computes one.
    pub cost: Option<f64>,
}

/// Host storage for analysis results.
pub trait AnalysisReporter {
    fn report_issue(&mut self, file: &FileRef, issue: IssueReport);

    fn report_metric(&mut self, file: &FileRef, metric: Metric, value: i64);

    fn report_line_data(&mut self, file: &FileRef, metric: LineMetric, lines: &[u32]);

    fn report_nosonar_lines(&mut self, file: &FileRef, lines: &BTreeSet<u32>);

    fn report_highlight(&mut self, file: &FileRef, range: TextRange, token_type: TokenType);

    fn report_symbol(&mut self, file: &FileRef, declaration: TextRange, references: &[TextRange]);

    fn report_duplication_token(&mut self, file: &FileRef, range: TextRange, normalized_text: &str);

    fn report_analysis_error(&mut self, file: &FileRef, line: u32, col: u32, message: &str);
}
