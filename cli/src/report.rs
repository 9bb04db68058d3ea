//! In-memory sink for analysis results, rendered as text or JSON.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use lintbridge_runner::RunSummary;
use lintbridge_types::{
    AnalysisReporter, FileRef, IssueLocation, IssueReport, LineMetric, Metric, TextRange, TokenType,
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Serialize)]
pub struct HighlightEntry {
    pub range: TextRange,
    pub token_type: TokenType,
}

#[derive(Debug, Serialize)]
pub struct SymbolEntry {
    pub declaration: TextRange,
    pub references: Vec<TextRange>,
}

#[derive(Debug, Serialize)]
pub struct DuplicationToken {
    pub range: TextRange,
    pub image: String,
}

#[derive(Debug, Serialize)]
pub struct AnalysisErrorEntry {
    pub line: u32,
    pub col: u32,
    pub message: String,
}

/// Everything reported for one file.
#[derive(Debug, Default, Serialize)]
pub struct FileReport {
    pub issues: Vec<IssueReport>,
    pub metrics: BTreeMap<&'static str, i64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub line_data: BTreeMap<&'static str, Vec<u32>>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub nosonar_lines: BTreeSet<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub highlights: Vec<HighlightEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub symbols: Vec<SymbolEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub duplication_tokens: Vec<DuplicationToken>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub analysis_errors: Vec<AnalysisErrorEntry>,
}

#[derive(Debug, Default)]
pub struct CollectingReporter {
    files: BTreeMap<String, FileReport>,
}

impl CollectingReporter {
    fn entry(&mut self, file: &FileRef) -> &mut FileReport {
        self.files.entry(file.key().to_string()).or_default()
    }

    pub fn files(&self) -> &BTreeMap<String, FileReport> {
        &self.files
    }

    pub fn issue_count(&self) -> usize {
        self.files.values().map(|report| report.issues.len()).sum()
    }

    pub fn to_json(&self, summary: Option<&RunSummary>) -> serde_json::Result<String> {
        #[derive(Serialize)]
        struct Output<'a> {
            files: &'a BTreeMap<String, FileReport>,
            #[serde(skip_serializing_if = "Option::is_none")]
            summary: Option<SummaryOutput>,
        }

        serde_json::to_string_pretty(&Output {
            files: &self.files,
            summary: summary.map(SummaryOutput::from),
        })
    }

    /// One line per issue and analysis error, `path:line:col: [RULE] message`.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (path, report) in &self.files {
            for error in &report.analysis_errors {
                let _ = writeln!(
                    out,
                    "{path}:{}:{}: parse error: {}",
                    error.line, error.col, error.message
                );
            }
            for issue in &report.issues {
                let position = match issue.primary {
                    IssueLocation::File => String::new(),
                    IssueLocation::Line { line } => format!("{line}:"),
                    IssueLocation::Range { range } => {
                        format!("{}:{}:", range.start_line, range.start_col)
                    }
                };
                let _ = writeln!(out, "{path}:{position} [{}] {}", issue.rule_key, issue.message);
            }
        }
        out
    }
}

#[derive(Serialize)]
struct SummaryOutput {
    units: usize,
    files: usize,
    fallback_files: usize,
    issues: usize,
    parse_failures: usize,
    unresolved_paths: usize,
    failed_units: Vec<String>,
}

impl From<&RunSummary> for SummaryOutput {
    fn from(summary: &RunSummary) -> Self {
        Self {
            units: summary.units,
            files: summary.files,
            fallback_files: summary.fallback_files,
            issues: summary.issues,
            parse_failures: summary.parse_failures,
            unresolved_paths: summary.unresolved_paths,
            failed_units: summary.failed_units.iter().map(ToString::to_string).collect(),
        }
    }
}

fn line_metric_label(metric: LineMetric) -> &'static str {
    match metric {
        LineMetric::NclocData => "ncloc_data",
        LineMetric::CommentLinesData => "comment_lines_data",
        LineMetric::ExecutableLinesData => "executable_lines_data",
    }
}

impl AnalysisReporter for CollectingReporter {
    fn report_issue(&mut self, file: &FileRef, issue: IssueReport) {
        self.entry(file).issues.push(issue);
    }

    fn report_metric(&mut self, file: &FileRef, metric: Metric, value: i64) {
        self.entry(file).metrics.insert(metric.label(), value);
    }

    fn report_line_data(&mut self, file: &FileRef, metric: LineMetric, lines: &[u32]) {
        self.entry(file)
            .line_data
            .insert(line_metric_label(metric), lines.to_vec());
    }

    fn report_nosonar_lines(&mut self, file: &FileRef, lines: &BTreeSet<u32>) {
        self.entry(file).nosonar_lines.extend(lines.iter().copied());
    }

    fn report_highlight(&mut self, file: &FileRef, range: TextRange, token_type: TokenType) {
        self.entry(file)
            .highlights
            .push(HighlightEntry { range, token_type });
    }

    fn report_symbol(&mut self, file: &FileRef, declaration: TextRange, references: &[TextRange]) {
        self.entry(file).symbols.push(SymbolEntry {
            declaration,
            references: references.to_vec(),
        });
    }

    fn report_duplication_token(&mut self, file: &FileRef, range: TextRange, normalized_text: &str) {
        self.entry(file).duplication_tokens.push(DuplicationToken {
            range,
            image: normalized_text.to_string(),
        });
    }

    fn report_analysis_error(&mut self, file: &FileRef, line: u32, col: u32, message: &str) {
        self.entry(file).analysis_errors.push(AnalysisErrorEntry {
            line,
            col,
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(primary: IssueLocation) -> IssueReport {
        IssueReport {
            rule_key: "S1764".to_string(),
            primary,
            secondary: Vec::new(),
            message: "Identical sub-expressions".to_string(),
            cost: None,
        }
    }

    #[test]
    fn text_output_lists_issues_by_file() {
        let mut reporter = CollectingReporter::default();
        let file = FileRef::on_disk("/p/src/a.ts").with_key("src/a.ts");
        reporter.report_issue(
            &file,
            issue(IssueLocation::Range {
                range: TextRange::new(3, 4, 3, 9),
            }),
        );
        reporter.report_issue(&file, issue(IssueLocation::File));
        reporter.report_analysis_error(&file, 7, 1, "Unexpected token");

        let text = reporter.to_text();
        assert_eq!(
            text,
            "src/a.ts:7:1: parse error: Unexpected token\n\
             src/a.ts:3:4: [S1764] Identical sub-expressions\n\
             src/a.ts: [S1764] Identical sub-expressions\n"
        );
        assert_eq!(reporter.issue_count(), 2);
    }

    #[test]
    fn json_output_uses_metric_labels() {
        let mut reporter = CollectingReporter::default();
        let file = FileRef::on_disk("/p/a.ts").with_key("a.ts");
        reporter.report_metric(&file, Metric::Ncloc, 12);
        reporter.report_line_data(&file, LineMetric::NclocData, &[1, 2]);

        let json: serde_json::Value =
            serde_json::from_str(&reporter.to_json(None).unwrap()).unwrap();
        assert_eq!(json["files"]["a.ts"]["metrics"]["ncloc"], 12);
        assert_eq!(
            json["files"]["a.ts"]["line_data"]["ncloc_data"],
            serde_json::json!([1, 2])
        );
        assert!(json.get("summary").is_none());
    }
}
