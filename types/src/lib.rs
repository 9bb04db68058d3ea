//! Core domain types for lintbridge.
//!
//! This crate holds the data model shared by the runner and the binary: input
//! files and analysis units, the engine wire records, rule configuration
//! payloads, and the reporting contracts the host implements. No async and no
//! process handling lives here.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod files;
mod report;
mod rules;
mod unit;
mod wire;

pub use files::{FileRef, FileSystemView};
pub use report::{
    AnalysisReporter, IssueLocation, IssueReport, LineMetric, Metric, SecondaryReport, TextRange,
    TokenType,
};
pub use rules::{RuleArgument, RuleToExecute};
pub use unit::{AnalysisUnit, ConfigKey};
pub use wire::{
    AnalysisRequest, AnalysisResponse, ContextualRequest, CpdToken, EngineDiagnostic, Highlight,
    Issue, Position, SecondaryLocation, Symbol, SymbolReference,
};
