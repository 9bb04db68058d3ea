//! Analysis units: files analyzed together under one configuration.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::files::FileRef;

/// Which configuration a unit is analyzed under.
///
/// Ordering puts every found configuration (by path) before the fallback
/// bucket, so plans iterate deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConfigKey {
    /// Absolute path of the nearest configuration file.
    Found(PathBuf),
    /// Fallback bucket for files with no discoverable configuration.
    NoConfig,
}

impl ConfigKey {
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Found(path) => Some(path),
            Self::NoConfig => None,
        }
    }

    #[must_use]
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::NoConfig)
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Found(path) => write!(f, "{}", path.display()),
            Self::NoConfig => f.write_str("no-config"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisUnit {
    config: ConfigKey,
    files: Vec<FileRef>,
}

impl AnalysisUnit {
    #[must_use]
    pub fn new(config: ConfigKey, files: Vec<FileRef>) -> Self {
        Self { config, files }
    }

    #[must_use]
    pub fn config(&self) -> &ConfigKey {
        &self.config
    }

    #[must_use]
    pub fn files(&self) -> &[FileRef] {
        &self.files
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_sorts_after_found_configs() {
        let mut keys = vec![
            ConfigKey::NoConfig,
            ConfigKey::Found(PathBuf::from("/b/tsconfig.json")),
            ConfigKey::Found(PathBuf::from("/a/tsconfig.json")),
        ];
        keys.sort();
        assert_eq!(keys[0], ConfigKey::Found(PathBuf::from("/a/tsconfig.json")));
        assert_eq!(keys[2], ConfigKey::NoConfig);
    }

    #[test]
    fn display_names_the_fallback_bucket() {
        assert_eq!(ConfigKey::NoConfig.to_string(), "no-config");
        assert!(ConfigKey::NoConfig.path().is_none());
    }
}
