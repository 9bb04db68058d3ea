//! Orchestration of external analysis engines.
//!
//! Two ways to run an engine:
//! - [`Orchestrator`]: one process per analysis unit, request on stdin,
//!   results on stdout.
//! - [`PersistentServer`]: one long-lived process answering single-file
//!   requests over a loopback socket.

pub mod codec;
pub mod dispatch;
pub mod drain;
pub mod launcher;
pub mod planner;
pub mod rules;
pub mod wire;

mod error;
mod orchestrator;
mod server;

#[cfg(all(test, unix))]
mod testing;

pub use error::{EngineError, PlanError, RunError, WireError};
pub use launcher::{
    EngineCommand, RuntimeSettings, RuntimeVersion, SearchPath, SearchPathSettings,
};
pub use orchestrator::{Orchestrator, OrchestratorSettings, RunSummary, UnitOutcome};
pub use planner::{Plan, PlannerSettings};
pub use rules::{BUILTIN_RULES, RuleDefinition, RuleOverrides, RuleRegistry};
pub use server::{PersistentServer, ServerSettings, ServerState};
