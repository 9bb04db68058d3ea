//! Turning one engine response into reporter calls.
//!
//! Engine lines are 0-based for issue positions and secondary locations and
//! 1-based for everything else; the reporter always sees 1-based lines.

use std::collections::BTreeSet;

use lintbridge_types::{
    AnalysisReporter, AnalysisResponse, FileRef, Issue, IssueLocation, IssueReport, LineMetric,
    Metric, SecondaryReport, TextRange, TokenType,
};

use crate::rules::RuleRegistry;

/// Rules whose issues are attached to the whole file.
const FILE_LEVEL_RULES: &[&str] = &["S104", "S113", "S1451"];

/// Rules whose issues are attached to a whole line.
const LINE_LEVEL_RULES: &[&str] = &["S1438"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub issues: usize,
    pub skipped_issues: usize,
    /// The file failed to parse; only analysis errors were reported.
    pub parse_failed: bool,
}

/// Report everything in `response` against `file`.
///
/// Order: highlights, symbols, metrics, line data, NOSONAR lines,
/// duplication tokens, issues. A response with diagnostics reports only the
/// diagnostics.
pub fn dispatch_response(
    response: &AnalysisResponse,
    file: &FileRef,
    registry: &RuleRegistry,
    reporter: &mut dyn AnalysisReporter,
) -> DispatchOutcome {
    let mut outcome = DispatchOutcome::default();

    if response.has_diagnostics() {
        for diagnostic in &response.diagnostics {
            tracing::warn!(
                "Failed to parse {} at line {}: {}",
                file.key(),
                diagnostic.line,
                diagnostic.message
            );
            reporter.report_analysis_error(file, diagnostic.line, diagnostic.col, &diagnostic.message);
        }
        outcome.parse_failed = true;
        return outcome;
    }

    for highlight in &response.highlights {
        let Some(token_type) = TokenType::from_engine(&highlight.text_type) else {
            tracing::debug!("Unknown highlighting type '{}', skipping", highlight.text_type);
            continue;
        };
        let range = TextRange::new(
            highlight.start_line,
            highlight.start_col,
            highlight.end_line,
            highlight.end_col,
        );
        reporter.report_highlight(file, range, token_type);
    }

    for symbol in &response.symbols {
        let declaration =
            TextRange::new(symbol.start_line, symbol.start_col, symbol.end_line, symbol.end_col);
        let references: Vec<TextRange> = symbol
            .references
            .iter()
            .map(|r| TextRange::new(r.start_line, r.start_col, r.end_line, r.end_col))
            .collect();
        reporter.report_symbol(file, declaration, &references);
    }

    for (metric, value) in [
        (Metric::Functions, response.functions),
        (Metric::Classes, response.classes),
        (Metric::Statements, response.statements),
        (Metric::Ncloc, len_as_metric(&response.ncloc)),
        (Metric::CommentLines, len_as_metric(&response.comment_lines)),
        (Metric::Complexity, response.complexity),
        (Metric::CognitiveComplexity, response.cognitive_complexity),
    ] {
        reporter.report_metric(file, metric, value);
    }

    reporter.report_line_data(file, LineMetric::NclocData, &response.ncloc);
    reporter.report_line_data(file, LineMetric::CommentLinesData, &response.comment_lines);
    reporter.report_line_data(
        file,
        LineMetric::ExecutableLinesData,
        &response.executable_lines,
    );

    let nosonar: BTreeSet<u32> = response.nosonar_lines.iter().copied().collect();
    reporter.report_nosonar_lines(file, &nosonar);

    for token in &response.cpd_tokens {
        let range = TextRange::new(token.start_line, token.start_col, token.end_line, token.end_col);
        reporter.report_duplication_token(file, range, &token.image);
    }

    for issue in &response.issues {
        let Some(rule_key) = registry.rule_key_for_engine_key(&issue.rule_name) else {
            tracing::warn!(
                "Unknown rule name '{}' reported for {}, skipping the issue",
                issue.rule_name,
                file.key()
            );
            outcome.skipped_issues += 1;
            continue;
        };
        reporter.report_issue(file, issue_report(issue, rule_key));
        outcome.issues += 1;
    }

    outcome
}

fn len_as_metric(lines: &[u32]) -> i64 {
    i64::try_from(lines.len()).unwrap_or(i64::MAX)
}

/// Anchor an engine issue according to its rule's granularity.
#[must_use]
pub fn issue_report(issue: &Issue, rule_key: &str) -> IssueReport {
    let primary = if FILE_LEVEL_RULES.contains(&rule_key) {
        IssueLocation::File
    } else if LINE_LEVEL_RULES.contains(&rule_key) {
        IssueLocation::Line {
            line: issue.start_position.line + 1,
        }
    } else {
        IssueLocation::Range {
            range: TextRange::new(
                issue.start_position.line + 1,
                issue.start_position.character,
                issue.end_position.line + 1,
                issue.end_position.character,
            ),
        }
    };

    let secondary = issue
        .secondary_locations
        .iter()
        .map(|location| SecondaryReport {
            range: TextRange::new(
                location.start_line + 1,
                location.start_col,
                location.end_line + 1,
                location.end_col,
            ),
            message: location.message.clone(),
        })
        .collect();

    IssueReport {
        rule_key: rule_key.to_string(),
        primary,
        secondary,
        message: issue.failure.clone(),
        cost: issue.cost,
    }
}
