//! Grouping input files into analysis units by nearest compiler config.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use lintbridge_types::{AnalysisUnit, ConfigKey, FileRef};

use crate::error::PlanError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerSettings {
    /// Name of the per-directory configuration file.
    pub config_file_name: String,
    /// Force every file into one unit under this configuration.
    pub config_override: Option<PathBuf>,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            config_file_name: "tsconfig.json".to_string(),
            config_override: None,
        }
    }
}

/// Files grouped by configuration, found configurations first (by path),
/// the fallback bucket last.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    units: BTreeMap<ConfigKey, Vec<FileRef>>,
    fallback_count: usize,
}

impl Plan {
    /// Files that matched no configuration.
    #[must_use]
    pub fn fallback_count(&self) -> usize {
        self.fallback_count
    }

    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    #[must_use]
    pub fn file_count(&self) -> usize {
        self.units.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn files_for(&self, key: &ConfigKey) -> Option<&[FileRef]> {
        self.units.get(key).map(Vec::as_slice)
    }

    #[must_use]
    pub fn into_units(self) -> Vec<AnalysisUnit> {
        self.units
            .into_iter()
            .map(|(config, files)| AnalysisUnit::new(config, files))
            .collect()
    }
}

/// Assign each file to the nearest configuration file at or above its
/// directory, without leaving `project_root`.
///
/// Input order is preserved within each unit. Missing configurations are
/// summarized in a single warning, never one per file.
pub fn plan(
    files: Vec<FileRef>,
    project_root: &Path,
    settings: &PlannerSettings,
) -> Result<Plan, PlanError> {
    if !project_root.is_dir() {
        return Err(PlanError::MissingProjectRoot {
            path: project_root.to_path_buf(),
        });
    }

    let mut result = Plan::default();
    if files.is_empty() {
        return Ok(result);
    }

    if let Some(forced) = &settings.config_override {
        tracing::debug!(
            "Using {} for all {} file(s)",
            forced.display(),
            files.len()
        );
        result.units.insert(ConfigKey::Found(forced.clone()), files);
        return Ok(result);
    }

    for file in files {
        let key = match find_config(file.absolute_path(), project_root, &settings.config_file_name)
        {
            Some(config) => ConfigKey::Found(config),
            None => {
                result.fallback_count += 1;
                ConfigKey::NoConfig
            }
        };
        result.units.entry(key).or_default().push(file);
    }

    if result.fallback_count > 0 {
        tracing::warn!(
            "{} file(s) were not matched to any {} (looking up the directories tree); they are analyzed with the default configuration",
            result.fallback_count,
            settings.config_file_name
        );
    }
    for (key, files) in &result.units {
        tracing::debug!(config = %key, "{} file(s) in unit", files.len());
    }

    Ok(result)
}

/// Walk from the file's directory up to `project_root`, inclusive.
///
/// Directories outside the root are never searched, so a file outside the
/// project lands in the fallback bucket.
fn find_config(file: &Path, project_root: &Path, name: &str) -> Option<PathBuf> {
    let mut dir = file.parent();
    while let Some(current) = dir {
        if !current.starts_with(project_root) {
            return None;
        }
        let candidate = current.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        if current == project_root {
            return None;
        }
        dir = current.parent();
    }
    None
}
