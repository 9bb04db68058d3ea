//! `lintbridge` - run an external TypeScript analysis engine over a project.
//!
//! Logs go to stderr (filtered by `RUST_LOG`); results go to stdout.
//!
//! Exit codes: 0 when every unit was analyzed, 1 on a fatal error (bad
//! configuration, incompatible runtime, server that never started), 2 when
//! the run completed but some units or files could not be analyzed.

mod files;
mod report;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use lintbridge_config::{LintbridgeConfig, PROJECT_CONFIG_FILE};
use lintbridge_runner::dispatch::dispatch_response;
use lintbridge_runner::{BUILTIN_RULES, Orchestrator, PersistentServer, RunSummary};

use crate::files::LocalFileSystem;
use crate::report::{CollectingReporter, OutputFormat};

const EXIT_FATAL: u8 = 1;
const EXIT_INCOMPLETE: u8 = 2;

#[derive(Parser)]
#[command(name = "lintbridge")]
#[command(about = "Run external TypeScript analysis engines and collect their results")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a whole project, one engine process per tsconfig
    Analyze {
        /// Project root
        #[arg(long, default_value = ".")]
        project: PathBuf,
        /// Configuration file (default: lintbridge.toml in the project, then
        /// ~/.lintbridge/config.toml)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Analyze every file with this tsconfig instead of looking one up
        #[arg(long)]
        tsconfig: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Analyze individual files through a long-lived engine server
    ServeFile {
        /// Files to analyze
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long, default_value = ".")]
        project: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// List the built-in rules and whether they are active
    Rules {
        #[arg(long, default_value = ".")]
        project: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::try_new("warn").expect("warn filter is valid"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(std::io::stderr().is_terminal())
                .with_target(false),
        )
        .with(env_filter)
        .init();
}

fn project_root(project: &Path) -> Result<PathBuf> {
    project
        .canonicalize()
        .with_context(|| format!("project root {} is not accessible", project.display()))
}

fn load_config(explicit: Option<&Path>, root: &Path) -> Result<LintbridgeConfig> {
    LintbridgeConfig::load(explicit, root)?.with_context(|| {
        format!(
            "no configuration found; create {} in {}",
            PROJECT_CONFIG_FILE,
            root.display()
        )
    })
}

fn print_results(
    reporter: &CollectingReporter,
    format: OutputFormat,
    summary: Option<&RunSummary>,
) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", reporter.to_json(summary)?),
        OutputFormat::Text => print!("{}", reporter.to_text()),
    }
    Ok(())
}

async fn analyze(
    project: &Path,
    config: Option<&Path>,
    tsconfig: Option<&Path>,
    format: OutputFormat,
) -> Result<ExitCode> {
    let root = project_root(project)?;
    let config = load_config(config, &root)?;
    let settings = config.orchestrator_settings(tsconfig)?;
    let files = LocalFileSystem::scan(&root, &config.extensions(), config.respect_gitignore());

    let orchestrator = Orchestrator::new(settings, root, config.rule_registry());
    let mut reporter = CollectingReporter::default();
    let summary = match orchestrator.analyze(&files, &mut reporter).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!("{e}");
            return Ok(ExitCode::from(EXIT_FATAL));
        }
    };

    print_results(&reporter, format, Some(&summary))?;
    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_INCOMPLETE)
    })
}

async fn serve_files(
    paths: &[PathBuf],
    project: &Path,
    config: Option<&Path>,
    format: OutputFormat,
) -> Result<ExitCode> {
    let root = project_root(project)?;
    let config = load_config(config, &root)?;
    let server = PersistentServer::new(config.server_settings(Some(&root))?);
    let registry = config.rule_registry();

    let mut resolved = Vec::with_capacity(paths.len());
    for path in paths {
        resolved.push(
            path.canonicalize()
                .with_context(|| format!("cannot access {}", path.display()))?,
        );
    }
    let files = LocalFileSystem::from_paths(resolved, Some(&root));

    if !server.start().await {
        return Ok(ExitCode::from(EXIT_FATAL));
    }

    let mut reporter = CollectingReporter::default();
    let mut incomplete = false;
    for file in files.files() {
        match server.analyze_file(file, &registry).await {
            Some(response) => {
                let outcome = dispatch_response(&response, file, &registry, &mut reporter);
                incomplete |= outcome.parse_failed;
            }
            None => incomplete = true,
        }
    }
    server.stop().await;

    print_results(&reporter, format, None)?;
    Ok(if incomplete {
        ExitCode::from(EXIT_INCOMPLETE)
    } else {
        ExitCode::SUCCESS
    })
}

fn list_rules(project: &Path, config: Option<&Path>) -> Result<ExitCode> {
    let root = project_root(project)?;
    let registry = LintbridgeConfig::load(config, &root)?
        .map(|config| config.rule_registry())
        .unwrap_or_default();

    for definition in BUILTIN_RULES {
        let active = registry
            .active()
            .iter()
            .find(|rule| rule.definition().key == definition.key);
        let status = if active.is_some() { "active" } else { "inactive" };
        let arguments = match active {
            Some(rule) if !rule.arguments().is_empty() => {
                serde_json::to_string(rule.arguments())?
            }
            _ => String::new(),
        };
        println!(
            "{:<6} {:<28} {:<8} {}",
            definition.key, definition.engine_key, status, arguments
        );
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match &cli.command {
        Commands::Analyze {
            project,
            config,
            tsconfig,
            format,
        } => analyze(project, config.as_deref(), tsconfig.as_deref(), *format).await,
        Commands::ServeFile {
            files,
            project,
            config,
            format,
        } => serve_files(files, project, config.as_deref(), *format).await,
        Commands::Rules { project, config } => list_rules(project, config.as_deref()),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}
