//! Error taxonomy for engine runs.
//!
//! Every engine-facing variant carries the full command line so a log line
//! alone is enough to reproduce the failing invocation.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Engine output could not be turned into responses.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("returned an empty output")]
    EmptyOutput,
    #[error("returned malformed output: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to start external process `{command}`: {source}. Re-run with RUST_LOG=debug for more information")]
    ProcessStart {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Incompatible runtime `{command}`: {detail}. Re-run with RUST_LOG=debug for more information")]
    IncompatibleRuntime { command: String, detail: String },

    #[error("Runtime version probe `{command}` did not finish within {timeout:?}. Re-run with RUST_LOG=debug for more information")]
    ProbeTimeout { command: String, timeout: Duration },

    #[error("Failed to serialize the request for `{command}`: {source}. Re-run with RUST_LOG=debug for more information")]
    Encode {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("External process `{command}` {source}. Re-run with RUST_LOG=debug for more information")]
    Decode {
        command: String,
        #[source]
        source: WireError,
    },

    #[error("I/O failure while talking to `{command}`: {source}. Re-run with RUST_LOG=debug for more information")]
    Io {
        command: String,
        #[source]
        source: io::Error,
    },
}

impl EngineError {
    /// The command line of the failed invocation.
    #[must_use]
    pub fn command(&self) -> &str {
        match self {
            Self::ProcessStart { command, .. }
            | Self::IncompatibleRuntime { command, .. }
            | Self::ProbeTimeout { command, .. }
            | Self::Encode { command, .. }
            | Self::Decode { command, .. }
            | Self::Io { command, .. } => command,
        }
    }

    /// Failures that make every further launch pointless for this run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::IncompatibleRuntime { .. } | Self::ProbeTimeout { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("project root {} does not exist or is not a directory", path.display())]
    MissingProjectRoot { path: PathBuf },
}

/// Failures that abort a whole run before or instead of per-unit work.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}
