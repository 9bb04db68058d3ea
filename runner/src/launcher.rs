//! Spawning engine processes.
//!
//! Every launch pipes stderr (it is always drained, see [`crate::drain`]),
//! kills the child when its handle is dropped, and may prepend a module
//! location to the runtime's search-path variable.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use crate::error::EngineError;

const MODULES_DIR: &str = "node_modules";

/// How the JavaScript runtime is invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    /// Runtime executable, resolved through `PATH` unless absolute.
    pub executable: String,
    /// Heap cap in MiB passed as `--max-old-space-size`.
    pub max_old_space_size: u32,
    pub minimum_major_version: u32,
    pub probe_timeout: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            executable: "node".to_string(),
            max_old_space_size: 2048,
            minimum_major_version: 6,
            probe_timeout: Duration::from_secs(10),
        }
    }
}

impl RuntimeSettings {
    /// `<runtime> --max-old-space-size=N <entrypoint> <extra...>`
    #[must_use]
    pub fn engine_command(&self, entrypoint: &Path, extra_args: &[String]) -> EngineCommand {
        let mut args = Vec::with_capacity(extra_args.len() + 2);
        args.push(format!("--max-old-space-size={}", self.max_old_space_size));
        args.push(entrypoint.display().to_string());
        args.extend(extra_args.iter().cloned());
        EngineCommand::new(self.executable.clone(), args)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    program: String,
    args: Vec<String>,
}

impl EngineCommand {
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Module search path
// ============================================================================

/// Where to look for the engine's compiler dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPathSettings {
    /// Environment variable the runtime consults, e.g. `NODE_PATH`.
    pub variable: String,
    /// Module to look for under the project's `node_modules` directories.
    pub module: String,
    /// Explicit location; skips the project lookup when set.
    pub location: Option<PathBuf>,
}

impl Default for SearchPathSettings {
    fn default() -> Self {
        Self {
            variable: "NODE_PATH".to_string(),
            module: "typescript".to_string(),
            location: None,
        }
    }
}

/// Environment override applied to every launched process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPath {
    variable: String,
    prepend: Option<PathBuf>,
}

impl SearchPath {
    /// Leave the variable as the parent environment has it.
    #[must_use]
    pub fn inherit(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            prepend: None,
        }
    }

    #[must_use]
    pub fn prepend(variable: impl Into<String>, location: PathBuf) -> Self {
        Self {
            variable: variable.into(),
            prepend: Some(location),
        }
    }

    #[must_use]
    pub fn variable(&self) -> &str {
        &self.variable
    }

    #[must_use]
    pub fn location(&self) -> Option<&Path> {
        self.prepend.as_deref()
    }

    /// Value the variable takes in the child, given the parent's value.
    ///
    /// `None` means the child inherits the variable untouched.
    #[must_use]
    pub fn resolved_value(&self, existing: Option<&OsStr>) -> Option<OsString> {
        let location = self.prepend.as_ref()?;
        let mut entries = vec![location.clone()];
        if let Some(existing) = existing.filter(|value| !value.is_empty()) {
            entries.extend(std::env::split_paths(existing));
        }
        match std::env::join_paths(entries) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(
                    "Cannot add {} to '{}': {e}",
                    location.display(),
                    self.variable
                );
                None
            }
        }
    }

    fn apply(&self, cmd: &mut Command) {
        let existing = std::env::var_os(&self.variable);
        if let Some(value) = self.resolved_value(existing.as_deref()) {
            tracing::debug!("Setting '{}' to {}", self.variable, value.to_string_lossy());
            cmd.env(&self.variable, value);
        }
    }
}

/// Decide the search-path override for a run rooted at `project_root`.
///
/// An explicit location wins; otherwise the project tree is searched for a
/// local copy of the module. With neither, the global one is used.
#[must_use]
pub fn resolve_search_path(settings: &SearchPathSettings, project_root: Option<&Path>) -> SearchPath {
    if let Some(location) = &settings.location {
        tracing::info!("Setting '{}' to {}", settings.variable, location.display());
        return SearchPath::prepend(&settings.variable, location.clone());
    }

    if let Some(root) = project_root {
        if let Some(found) = find_local_dependency(root, &settings.module) {
            tracing::info!("Setting '{}' to {}", settings.variable, found.display());
            return SearchPath::prepend(&settings.variable, found);
        }
        let [missing, fallback] = global_fallback_messages(settings);
        tracing::debug!("{missing}");
        tracing::debug!("{fallback}");
    } else {
        tracing::warn!(
            "No project root available; the global '{}' referenced in '{}' will be used",
            settings.module,
            settings.variable
        );
    }
    SearchPath::inherit(&settings.variable)
}

fn global_fallback_messages(settings: &SearchPathSettings) -> [String; 2] {
    let missing = if settings.module == "typescript" {
        "No TypeScript compiler found in your project".to_string()
    } else {
        format!("No '{}' module found in your project", settings.module)
    };
    [
        missing,
        format!("Global one referenced in '{}' will be used", settings.variable),
    ]
}

/// Depth-first search under `root` for `node_modules/<module>`.
///
/// Returns the `node_modules` directory that contains the module. Hidden
/// directories and nested `node_modules` trees are not descended into.
/// Siblings are visited in name order so the result is deterministic.
#[must_use]
pub fn find_local_dependency(root: &Path, module: &str) -> Option<PathBuf> {
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let modules_dir = dir.join(MODULES_DIR);
        if modules_dir.join(module).is_dir() {
            return Some(modules_dir);
        }

        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        let mut children: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
            .filter(|entry| {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                name != MODULES_DIR && !name.starts_with('.')
            })
            .map(|entry| entry.path())
            .collect();
        children.sort_unstable_by(|a, b| b.cmp(a));
        stack.extend(children);
    }
    None
}

// ============================================================================
// Processes
// ============================================================================

/// Which standard streams besides stderr are piped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessIo {
    /// stdin and stdout piped: the one-shot runner.
    Piped,
    /// stdin closed, stdout discarded: the server talks over a socket.
    StderrOnly,
}

/// A running engine process.
pub struct EngineProcess {
    command_line: String,
    child: Child,
}

impl EngineProcess {
    #[must_use]
    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    pub fn take_stdin(&mut self) -> Result<ChildStdin, EngineError> {
        self.child
            .stdin
            .take()
            .ok_or_else(|| self.missing_pipe("stdin"))
    }

    pub fn take_stdout(&mut self) -> Result<ChildStdout, EngineError> {
        self.child
            .stdout
            .take()
            .ok_or_else(|| self.missing_pipe("stdout"))
    }

    pub fn take_stderr(&mut self) -> Result<ChildStderr, EngineError> {
        self.child
            .stderr
            .take()
            .ok_or_else(|| self.missing_pipe("stderr"))
    }

    pub async fn wait(&mut self) -> Result<ExitStatus, EngineError> {
        self.child.wait().await.map_err(|source| EngineError::Io {
            command: self.command_line.clone(),
            source,
        })
    }

    /// Exit status if the process has already exited.
    pub fn try_wait(&mut self) -> Option<ExitStatus> {
        match self.child.try_wait() {
            Ok(status) => status,
            Err(e) => {
                tracing::debug!("Cannot poll `{}`: {e}", self.command_line);
                None
            }
        }
    }

    /// Give the process `grace` to exit on its own, then kill it.
    pub async fn terminate(mut self, grace: Duration) {
        if tokio::time::timeout(grace, self.child.wait()).await.is_err() {
            tracing::debug!("`{}` didn't exit in time, killing", self.command_line);
            if let Err(e) = self.child.kill().await {
                tracing::warn!("Failed to kill `{}`: {e}", self.command_line);
            }
        }
    }

    fn missing_pipe(&self, stream: &str) -> EngineError {
        EngineError::Io {
            command: self.command_line.clone(),
            source: io::Error::other(format!("{stream} of the child was not captured")),
        }
    }
}

fn resolve_program(program: &str, command_line: &str) -> Result<PathBuf, EngineError> {
    which::which(program).map_err(|e| EngineError::ProcessStart {
        command: command_line.to_string(),
        source: io::Error::new(io::ErrorKind::NotFound, format!("{program}: {e}")),
    })
}

/// Spawn `command` with the search-path override applied.
pub fn launch(
    command: &EngineCommand,
    search_path: &SearchPath,
    pipes: ProcessIo,
) -> Result<EngineProcess, EngineError> {
    let command_line = command.to_string();
    let resolved = resolve_program(command.program(), &command_line)?;

    let mut cmd = Command::new(&resolved);
    cmd.args(command.args())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    match pipes {
        ProcessIo::Piped => {
            cmd.stdin(Stdio::piped()).stdout(Stdio::piped());
        }
        ProcessIo::StderrOnly => {
            cmd.stdin(Stdio::null()).stdout(Stdio::null());
        }
    }
    search_path.apply(&mut cmd);

    tracing::debug!("Launching external process `{command_line}`");
    let child = cmd.spawn().map_err(|source| EngineError::ProcessStart {
        command: command_line.clone(),
        source,
    })?;

    Ok(EngineProcess {
        command_line,
        child,
    })
}

// ============================================================================
// Runtime version probe
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RuntimeVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl RuntimeVersion {
    /// Parse `vMAJOR.MINOR.PATCH` (the leading `v` is optional).
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let numbers = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let mut parts = numbers.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            major,
            minor,
            patch,
        })
    }
}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Validate the output of `<runtime> -v` against a minimum major version.
pub fn check_version_output(raw: &str, minimum_major: u32) -> Result<RuntimeVersion, String> {
    let version = RuntimeVersion::parse(raw)
        .ok_or_else(|| format!("cannot parse the runtime version from `{}`", raw.trim()))?;
    if version.major < minimum_major {
        return Err(format!(
            "only version {minimum_major} or newer is supported, found {version}"
        ));
    }
    Ok(version)
}

/// Run `<runtime> -v` and check the reported version.
///
/// Any failure here means no engine launch can succeed, so callers treat it
/// as fatal for the whole run.
pub async fn check_runtime_version(
    settings: &RuntimeSettings,
) -> Result<RuntimeVersion, EngineError> {
    let command = EngineCommand::new(settings.executable.clone(), vec!["-v".to_string()]);
    let command_line = command.to_string();
    let resolved = resolve_program(command.program(), &command_line)?;

    let mut cmd = Command::new(&resolved);
    cmd.args(command.args())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(settings.probe_timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => {
            return Err(EngineError::ProcessStart {
                command: command_line,
                source,
            });
        }
        Err(_) => {
            return Err(EngineError::ProbeTimeout {
                command: command_line,
                timeout: settings.probe_timeout,
            });
        }
    };

    let raw = String::from_utf8_lossy(&output.stdout);
    let version = check_version_output(&raw, settings.minimum_major_version).map_err(
        |detail| EngineError::IncompatibleRuntime {
            command: command_line.clone(),
            detail,
        },
    )?;
    tracing::debug!("Runtime `{}` reports {version}", settings.executable);
    Ok(version)
}
