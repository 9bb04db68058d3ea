//! Configuration for lintbridge.
//!
//! Settings come from one TOML file, looked up in order:
//! 1. an explicit path (`--config`),
//! 2. `<project>/lintbridge.toml`,
//! 3. `~/.lintbridge/config.toml`.
//!
//! Only the first file found is read. String values may reference
//! environment variables as `${VAR}`; relative paths are resolved against
//! the directory of the file they appear in.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs, io};

use lintbridge_runner::{
    OrchestratorSettings, PlannerSettings, RuleOverrides, RuleRegistry, RuntimeSettings,
    SearchPathSettings, ServerSettings,
};
use lintbridge_types::RuleArgument;
use serde::Deserialize;

pub const PROJECT_CONFIG_FILE: &str = "lintbridge.toml";

const DEFAULT_EXTENSIONS: &[&str] = &["ts", "tsx"];

pub(crate) const fn default_true() -> bool {
    true
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("missing required setting `{key}`; set it in lintbridge.toml or ~/.lintbridge/config.toml")]
    Missing { key: &'static str },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => Some(path),
            ConfigError::Missing { .. } => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LintbridgeConfig {
    pub runtime: Option<RuntimeConfig>,
    pub engine: Option<EngineConfig>,
    pub analysis: Option<AnalysisConfig>,
    pub server: Option<ServerConfig>,
    pub rules: Option<RulesConfig>,
    /// Directory of the file this was read from.
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RuntimeConfig {
    pub executable: Option<String>,
    pub max_old_space_size: Option<u32>,
    pub minimum_major_version: Option<u32>,
    pub probe_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EngineConfig {
    /// One-shot runner entry point.
    pub runner: Option<String>,
    /// Persistent server entry point.
    pub server: Option<String>,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisConfig {
    pub config_file_name: Option<String>,
    /// Analyze every file under this one compiler configuration.
    pub config_override: Option<String>,
    #[serde(default)]
    pub extensions: Vec<String>,
    pub dependency_module: Option<String>,
    pub dependency_location: Option<String>,
    pub search_path_variable: Option<String>,
    pub max_parallel_units: Option<usize>,
    pub drain_grace_ms: Option<u64>,
    /// Skip files ignored by `.gitignore` and friends.
    #[serde(default = "default_true")]
    pub respect_gitignore: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            config_file_name: None,
            config_override: None,
            extensions: Vec::new(),
            dependency_module: None,
            dependency_location: None,
            search_path_variable: None,
            max_parallel_units: None,
            drain_grace_ms: None,
            respect_gitignore: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ServerConfig {
    pub readiness_timeout_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub stop_grace_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RulesConfig {
    #[serde(default)]
    pub enabled: Vec<String>,
    #[serde(default)]
    pub disabled: Vec<String>,
    /// Parameters by rule key, replacing the rule's defaults.
    #[serde(default)]
    pub arguments: BTreeMap<String, Vec<RuleArgument>>,
}

pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let var = &after[..end];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

/// `~/.lintbridge/config.toml`
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".lintbridge").join("config.toml"))
}

/// The file [`LintbridgeConfig::load`] would read, if any.
#[must_use]
pub fn discover(explicit: Option<&Path>, project_root: &Path) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let project = project_root.join(PROJECT_CONFIG_FILE);
    if project.is_file() {
        return Some(project);
    }
    config_path().filter(|path| path.is_file())
}

impl LintbridgeConfig {
    /// Load the first configuration file found.
    ///
    /// An explicit path must exist; the implicit locations are optional.
    pub fn load(explicit: Option<&Path>, project_root: &Path) -> Result<Option<Self>, ConfigError> {
        match discover(explicit, project_root) {
            Some(path) => Self::load_from(&path).map(Some),
            None => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };
        let mut config = Self::parse(&content, path)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|err| {
            tracing::warn!("Failed to parse config at {:?}: {}", path, err);
            ConfigError::Parse {
                path: path.to_path_buf(),
                source: err,
            }
        })
    }

    /// Expand `${VAR}` and anchor relative paths at the config directory.
    fn resolve_path(&self, raw: &str) -> PathBuf {
        let path = PathBuf::from(expand_env_vars(raw));
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path,
        }
    }

    fn analysis(&self) -> Option<&AnalysisConfig> {
        self.analysis.as_ref()
    }

    #[must_use]
    pub fn runtime_settings(&self) -> RuntimeSettings {
        let mut settings = RuntimeSettings::default();
        if let Some(runtime) = &self.runtime {
            if let Some(executable) = &runtime.executable {
                settings.executable = expand_env_vars(executable);
            }
            if let Some(size) = runtime.max_old_space_size {
                settings.max_old_space_size = size;
            }
            if let Some(major) = runtime.minimum_major_version {
                settings.minimum_major_version = major;
            }
            if let Some(ms) = runtime.probe_timeout_ms {
                settings.probe_timeout = Duration::from_millis(ms);
            }
        }
        settings
    }

    #[must_use]
    pub fn search_path_settings(&self) -> SearchPathSettings {
        let mut settings = SearchPathSettings::default();
        if let Some(analysis) = self.analysis() {
            if let Some(variable) = &analysis.search_path_variable {
                settings.variable.clone_from(variable);
            }
            if let Some(module) = &analysis.dependency_module {
                settings.module.clone_from(module);
            }
            settings.location = analysis
                .dependency_location
                .as_deref()
                .map(|raw| self.resolve_path(raw));
        }
        settings
    }

    /// `tsconfig_override` (from the command line) beats the file.
    #[must_use]
    pub fn planner_settings(&self, tsconfig_override: Option<&Path>) -> PlannerSettings {
        let mut settings = PlannerSettings::default();
        if let Some(analysis) = self.analysis() {
            if let Some(name) = &analysis.config_file_name {
                settings.config_file_name.clone_from(name);
            }
            settings.config_override = analysis
                .config_override
                .as_deref()
                .map(|raw| self.resolve_path(raw));
        }
        if let Some(path) = tsconfig_override {
            settings.config_override = Some(path.to_path_buf());
        }
        settings
    }

    /// File extensions selected for analysis, without the dot.
    #[must_use]
    pub fn extensions(&self) -> Vec<String> {
        match self.analysis() {
            Some(analysis) if !analysis.extensions.is_empty() => analysis
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_string())
                .collect(),
            _ => DEFAULT_EXTENSIONS.iter().map(|ext| (*ext).to_string()).collect(),
        }
    }

    #[must_use]
    pub fn respect_gitignore(&self) -> bool {
        self.analysis().is_none_or(|analysis| analysis.respect_gitignore)
    }

    fn extra_args(&self) -> Vec<String> {
        self.engine
            .as_ref()
            .map(|engine| {
                engine
                    .extra_args
                    .iter()
                    .map(String::as_str)
                    .map(expand_env_vars)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn orchestrator_settings(
        &self,
        tsconfig_override: Option<&Path>,
    ) -> Result<OrchestratorSettings, ConfigError> {
        let runner = self
            .engine
            .as_ref()
            .and_then(|engine| engine.runner.as_deref())
            .ok_or(ConfigError::Missing {
                key: "engine.runner",
            })?;

        let mut settings = OrchestratorSettings::new(self.resolve_path(runner));
        settings.runtime = self.runtime_settings();
        settings.extra_args = self.extra_args();
        settings.search_path = self.search_path_settings();
        settings.planner = self.planner_settings(tsconfig_override);
        if let Some(analysis) = self.analysis() {
            if let Some(units) = analysis.max_parallel_units {
                settings.max_parallel_units = units.max(1);
            }
            if let Some(ms) = analysis.drain_grace_ms {
                settings.drain_grace = Duration::from_millis(ms);
            }
        }
        Ok(settings)
    }

    pub fn server_settings(&self, project_root: Option<&Path>) -> Result<ServerSettings, ConfigError> {
        let entrypoint = self
            .engine
            .as_ref()
            .and_then(|engine| engine.server.as_deref())
            .ok_or(ConfigError::Missing {
                key: "engine.server",
            })?;

        let mut settings = ServerSettings::new(self.resolve_path(entrypoint));
        settings.runtime = self.runtime_settings();
        settings.extra_args = self.extra_args();
        settings.search_path = self.search_path_settings();
        settings.project_root = project_root.map(Path::to_path_buf);
        if let Some(server) = &self.server {
            if let Some(ms) = server.readiness_timeout_ms {
                settings.readiness_timeout = Duration::from_millis(ms);
            }
            if let Some(ms) = server.request_timeout_ms {
                settings.request_timeout = Duration::from_millis(ms);
            }
            if let Some(ms) = server.stop_grace_ms {
                settings.stop_grace = Duration::from_millis(ms);
            }
        }
        if let Some(ms) = self.analysis().and_then(|a| a.drain_grace_ms) {
            settings.drain_grace = Duration::from_millis(ms);
        }
        Ok(settings)
    }

    #[must_use]
    pub fn rule_overrides(&self) -> RuleOverrides {
        self.rules
            .as_ref()
            .map(|rules| RuleOverrides {
                enabled: rules.enabled.clone(),
                disabled: rules.disabled.clone(),
                arguments: rules.arguments.clone(),
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn rule_registry(&self) -> RuleRegistry {
        RuleRegistry::with_overrides(&self.rule_overrides())
    }
}
