//! One-shot batch analysis: plan units, run the engine once per unit,
//! dispatch results.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream;
use lintbridge_types::{
    AnalysisReporter, AnalysisRequest, AnalysisResponse, AnalysisUnit, ConfigKey, FileSystemView,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::dispatch::dispatch_response;
use crate::drain::{self, InvalidSourceHandler, MissingModuleHandler};
use crate::error::{EngineError, RunError};
use crate::launcher::{self, ProcessIo, RuntimeSettings, SearchPath, SearchPathSettings};
use crate::planner::{self, PlannerSettings};
use crate::rules::RuleRegistry;
use crate::wire;

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub runtime: RuntimeSettings,
    /// Entry point of the one-shot runner script.
    pub runner: PathBuf,
    pub extra_args: Vec<String>,
    pub search_path: SearchPathSettings,
    pub planner: PlannerSettings,
    /// How long to wait for stderr to close after the process exits.
    pub drain_grace: Duration,
    /// Units run concurrently; 1 runs them one after another.
    pub max_parallel_units: usize,
}

impl OrchestratorSettings {
    #[must_use]
    pub fn new(runner: PathBuf) -> Self {
        Self {
            runtime: RuntimeSettings::default(),
            runner,
            extra_args: Vec::new(),
            search_path: SearchPathSettings::default(),
            planner: PlannerSettings::default(),
            drain_grace: Duration::from_secs(5),
            max_parallel_units: 1,
        }
    }
}

/// Engine answers for one unit, in the order the engine wrote them.
#[derive(Debug, Clone)]
pub struct UnitOutcome {
    config: ConfigKey,
    responses: Vec<AnalysisResponse>,
}

impl UnitOutcome {
    #[must_use]
    pub fn config(&self) -> &ConfigKey {
        &self.config
    }

    #[must_use]
    pub fn responses(&self) -> &[AnalysisResponse] {
        &self.responses
    }

    #[must_use]
    pub fn get(&self, filepath: &str) -> Option<&AnalysisResponse> {
        self.responses.iter().find(|r| r.filepath == filepath)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub units: usize,
    pub files: usize,
    pub fallback_files: usize,
    pub issues: usize,
    pub parse_failures: usize,
    pub unresolved_paths: usize,
    pub failed_units: Vec<ConfigKey>,
}

impl RunSummary {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed_units.is_empty()
    }
}

pub struct Orchestrator {
    settings: OrchestratorSettings,
    project_root: PathBuf,
    registry: RuleRegistry,
}

impl Orchestrator {
    #[must_use]
    pub fn new(settings: OrchestratorSettings, project_root: PathBuf, registry: RuleRegistry) -> Self {
        Self {
            settings,
            project_root,
            registry,
        }
    }

    #[must_use]
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    #[must_use]
    pub fn build_request(&self, unit: &AnalysisUnit) -> AnalysisRequest {
        AnalysisRequest {
            filepaths: unit.files().iter().map(|f| f.wire_path()).collect(),
            tsconfig: unit
                .config()
                .path()
                .map(|p| p.to_string_lossy().into_owned()),
            rules: self.registry.rules_to_execute(),
            project_root: self.project_root.clone(),
        }
    }

    /// Run the engine once for `unit`.
    ///
    /// The request is written while stdout is read, so neither pipe can fill
    /// up and stall the other. stderr goes to its own drain.
    pub async fn run_unit(
        &self,
        unit: &AnalysisUnit,
        search_path: &SearchPath,
    ) -> Result<UnitOutcome, EngineError> {
        let request = self.build_request(unit);
        let command = self
            .settings
            .runtime
            .engine_command(&self.settings.runner, &self.settings.extra_args);
        let payload = wire::encode_request(&request).map_err(|source| EngineError::Encode {
            command: command.to_string(),
            source,
        })?;

        tracing::info!(
            config = %unit.config(),
            "Analyzing {} file(s)",
            unit.len()
        );

        let mut process = launcher::launch(&command, search_path, ProcessIo::Piped)?;
        let command_line = process.command_line().to_string();
        let stderr = process.take_stderr()?;
        let mut stdin = process.take_stdin()?;
        let mut stdout = process.take_stdout()?;

        let handlers = (
            MissingModuleHandler::new(
                command_line.clone(),
                &self.settings.search_path.module,
                search_path.variable(),
            ),
            InvalidSourceHandler::default(),
        );
        let drain = drain::attach(command_line.clone(), stderr, handlers);

        let write = async move {
            stdin.write_all(&payload).await?;
            stdin.shutdown().await
        };
        let read = async move {
            let mut output = Vec::new();
            stdout.read_to_end(&mut output).await.map(|_| output)
        };
        let (written, output) = tokio::join!(write, read);

        if let Err(e) = written {
            // The engine may close stdin early; its output decides the outcome.
            tracing::debug!("Writing request to `{command_line}` failed: {e}");
        }
        let output = output.map_err(|source| EngineError::Io {
            command: command_line.clone(),
            source,
        })?;

        let status = process.wait().await?;
        tracing::debug!("`{command_line}` exited with {status}");

        let handlers = drain.join(self.settings.drain_grace).await;

        match wire::decode_responses(&output) {
            Ok(responses) => Ok(UnitOutcome {
                config: unit.config().clone(),
                responses,
            }),
            Err(source) => {
                if let Some((_, invalid)) = &handlers
                    && let Some(rejected) = invalid.rejected_file()
                {
                    tracing::error!("{}", excluded_file_hint(rejected));
                }
                Err(EngineError::Decode {
                    command: command_line,
                    source,
                })
            }
        }
    }

    /// Analyze every input file of `files`, reporting into `reporter`.
    ///
    /// A runtime that fails the version probe aborts the run before any unit
    /// is launched. Any other failure only costs the unit it happened in.
    pub async fn analyze(
        &self,
        files: &dyn FileSystemView,
        reporter: &mut dyn AnalysisReporter,
    ) -> Result<RunSummary, RunError> {
        launcher::check_runtime_version(&self.settings.runtime).await?;

        let plan = planner::plan(
            files.list_input_files(),
            &self.project_root,
            &self.settings.planner,
        )?;
        let mut summary = RunSummary {
            units: plan.unit_count(),
            files: plan.file_count(),
            fallback_files: plan.fallback_count(),
            ..RunSummary::default()
        };
        if summary.files == 0 {
            tracing::info!("No files to analyze");
            return Ok(summary);
        }

        let search_path =
            launcher::resolve_search_path(&self.settings.search_path, Some(&self.project_root));
        let parallelism = self.settings.max_parallel_units.max(1);

        let mut results = stream::iter(plan.into_units())
            .map(|unit| {
                let search_path = &search_path;
                async move {
                    let result = self.run_unit(&unit, search_path).await;
                    (unit, result)
                }
            })
            .buffered(parallelism);

        while let Some((unit, result)) = results.next().await {
            match result {
                Ok(outcome) => self.dispatch_unit(&outcome, files, reporter, &mut summary),
                Err(e) => {
                    tracing::error!("{e}");
                    for file in unit.files() {
                        tracing::error!("Not analyzed due to a previous error: {}", file.key());
                    }
                    summary.failed_units.push(unit.config().clone());
                }
            }
        }

        tracing::info!(
            units = summary.units,
            failed = summary.failed_units.len(),
            issues = summary.issues,
            "Analysis finished"
        );
        Ok(summary)
    }

    fn dispatch_unit(
        &self,
        outcome: &UnitOutcome,
        files: &dyn FileSystemView,
        reporter: &mut dyn AnalysisReporter,
        summary: &mut RunSummary,
    ) {
        for response in outcome.responses() {
            let Some(file) = files.resolve_by_path(Path::new(&response.filepath)) else {
                tracing::error!("Failed to find input file for path `{}`", response.filepath);
                summary.unresolved_paths += 1;
                continue;
            };
            let dispatched = dispatch_response(response, &file, &self.registry, reporter);
            summary.issues += dispatched.issues;
            if dispatched.parse_failed {
                summary.parse_failures += 1;
            }
        }
    }
}

fn excluded_file_hint(rejected: &str) -> String {
    format!(
        "Probably `{rejected}` is excluded in your tsconfig.json, in this case exclude it from the analysis as well."
    )
}

#[cfg(all(test, unix))]
mod tests {
    use std::collections::BTreeSet;

    use lintbridge_types::{FileRef, IssueReport, LineMetric, Metric, TextRange, TokenType};

    use super::*;
    use crate::testing::{engine_script, fake_runtime};

    struct Files {
        files: Vec<FileRef>,
    }

    impl FileSystemView for Files {
        fn list_input_files(&self) -> Vec<FileRef> {
            self.files.clone()
        }

        fn resolve_by_path(&self, path: &Path) -> Option<FileRef> {
            self.files.iter().find(|f| f.absolute_path() == path).cloned()
        }
    }

    #[derive(Default)]
    struct Issues {
        issues: Vec<(String, IssueReport)>,
        metrics: usize,
    }

    impl AnalysisReporter for Issues {
        fn report_issue(&mut self, file: &FileRef, issue: IssueReport) {
            self.issues.push((file.key().to_string(), issue));
        }

        fn report_metric(&mut self, _file: &FileRef, _metric: Metric, _value: i64) {
            self.metrics += 1;
        }

        fn report_line_data(&mut self, _file: &FileRef, _metric: LineMetric, _lines: &[u32]) {}

        fn report_nosonar_lines(&mut self, _file: &FileRef, _lines: &BTreeSet<u32>) {}

        fn report_highlight(&mut self, _file: &FileRef, _range: TextRange, _token_type: TokenType) {}

        fn report_symbol(&mut self, _file: &FileRef, _declaration: TextRange, _references: &[TextRange]) {}

        fn report_duplication_token(&mut self, _file: &FileRef, _range: TextRange, _text: &str) {}

        fn report_analysis_error(&mut self, _file: &FileRef, _line: u32, _col: u32, _message: &str) {}
    }

    fn settings(dir: &Path, runner_body: &str, version: &str) -> OrchestratorSettings {
        let mut settings =
            OrchestratorSettings::new(engine_script(dir, "runner.sh", runner_body));
        settings.runtime.executable = fake_runtime(dir, version).display().to_string();
        settings.drain_grace = Duration::from_secs(2);
        settings
    }

    fn project(dir: &Path) -> (PathBuf, Files) {
        let root = dir.join("proj");
        std::fs::create_dir_all(root.join("a")).unwrap();
        std::fs::create_dir_all(root.join("b")).unwrap();
        std::fs::write(root.join("a/tsconfig.json"), "{}").unwrap();
        std::fs::write(root.join("a/a.ts"), "let a = 1;").unwrap();
        std::fs::write(root.join("b/c.ts"), "let c = 1;").unwrap();
        let files = Files {
            files: vec![
                FileRef::on_disk(root.join("a/a.ts")),
                FileRef::on_disk(root.join("b/c.ts")),
            ],
        };
        (root, files)
    }

    #[tokio::test]
    async fn empty_output_fails_each_unit_without_issues() {
        let dir = tempfile::tempdir().unwrap();
        let (root, files) = project(dir.path());
        let settings = settings(dir.path(), "cat > /dev/null\necho null\n", "v18.0.0");
        let orchestrator = Orchestrator::new(settings, root, RuleRegistry::default());

        let mut reporter = Issues::default();
        let summary = orchestrator.analyze(&files, &mut reporter).await.unwrap();

        assert_eq!(summary.units, 2);
        assert_eq!(summary.failed_units.len(), 2);
        assert!(!summary.is_success());
        assert!(reporter.issues.is_empty());
        assert_eq!(reporter.metrics, 0);
    }

    #[test]
    fn excluded_file_hint_names_the_rejected_file() {
        assert_eq!(
            excluded_file_hint("/p/gen/a.ts"),
            "Probably `/p/gen/a.ts` is excluded in your tsconfig.json, in this case exclude it from the analysis as well."
        );
    }

    #[tokio::test]
    async fn old_runtime_aborts_before_any_unit() {
        let dir = tempfile::tempdir().unwrap();
        let (root, files) = project(dir.path());
        let marker = dir.path().join("launched");
        let body = format!("touch {}\necho '[]'\n", marker.display());
        let settings = settings(dir.path(), &body, "v4.2.0");
        let orchestrator = Orchestrator::new(settings, root, RuleRegistry::default());

        let err = orchestrator
            .analyze(&files, &mut Issues::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RunError::Engine(EngineError::IncompatibleRuntime { .. })
        ));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn run_unit_sends_paths_config_and_rules() {
        let dir = tempfile::tempdir().unwrap();
        let (root, _files) = project(dir.path());
        let capture = dir.path().join("request.json");
        let body = format!("cat > {}\necho '[]'\n", capture.display());
        let settings = settings(dir.path(), &body, "v18.0.0");
        let orchestrator = Orchestrator::new(settings, root.clone(), RuleRegistry::default());

        let config = ConfigKey::Found(root.join("a/tsconfig.json"));
        let unit = AnalysisUnit::new(config, vec![FileRef::on_disk(root.join("a/a.ts"))]);
        let outcome = orchestrator
            .run_unit(&unit, &SearchPath::inherit("NODE_PATH"))
            .await
            .unwrap();
        assert!(outcome.responses().is_empty());

        let sent: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&capture).unwrap()).unwrap();
        assert_eq!(sent["filepaths"][0], root.join("a/a.ts").display().to_string());
        assert_eq!(sent["tsconfig"], root.join("a/tsconfig.json").display().to_string());
        assert_eq!(sent["rules"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn failing_unit_does_not_stop_the_others() {
        let dir = tempfile::tempdir().unwrap();
        let (root, files) = project(dir.path());
        // Answer only for requests that carry a config; the fallback unit
        // gets nothing back.
        let body = format!(
            r#"request=$(cat)
case "$request" in
  *'"tsconfig":null'*) exit 1 ;;
esac
printf '[{{"filepath":"%s","issues":[{{"failure":"dup","startPosition":{{"line":0,"character":0}},"endPosition":{{"line":0,"character":3}},"name":"%s","ruleName":"no-identical-expressions"}}]}}]' "{path}" "{path}"
"#,
            path = root.join("a/a.ts").display()
        );
        let settings = settings(dir.path(), &body, "v18.0.0");
        let orchestrator = Orchestrator::new(settings, root.clone(), RuleRegistry::default());

        let mut reporter = Issues::default();
        let summary = orchestrator.analyze(&files, &mut reporter).await.unwrap();

        assert_eq!(summary.failed_units, vec![ConfigKey::NoConfig]);
        assert_eq!(summary.issues, 1);
        assert_eq!(reporter.issues.len(), 1);
        assert_eq!(reporter.issues[0].0, root.join("a/a.ts").display().to_string());
        assert_eq!(reporter.issues[0].1.rule_key, "S1764");
    }

    #[tokio::test]
    async fn unknown_response_paths_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let (root, files) = project(dir.path());
        let body = "cat > /dev/null\necho '[{\"filepath\":\"/nowhere/x.ts\"}]'\n";
        let mut settings = settings(dir.path(), body, "v18.0.0");
        settings.max_parallel_units = 2;
        let orchestrator = Orchestrator::new(settings, root, RuleRegistry::default());

        let mut reporter = Issues::default();
        let summary = orchestrator.analyze(&files, &mut reporter).await.unwrap();
        assert!(summary.is_success());
        assert_eq!(summary.unresolved_paths, 2);
        assert_eq!(reporter.metrics, 0);
    }
}
