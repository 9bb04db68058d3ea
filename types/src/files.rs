//! Input files as seen through the host file system view.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A file the host asked us to analyze.
///
/// The runner only reads a `FileRef`; it never mutates or persists it beyond
/// the current run. Content is either supplied up front by the host (editor
/// buffers) or read from disk on demand.
#[derive(Debug, Clone)]
pub struct FileRef {
    absolute_path: PathBuf,
    key: String,
    content: Option<Arc<str>>,
}

impl FileRef {
    /// A file whose content lives on disk. The identity key defaults to the
    /// absolute path.
    #[must_use]
    pub fn on_disk(absolute_path: impl Into<PathBuf>) -> Self {
        let absolute_path = absolute_path.into();
        let key = absolute_path.to_string_lossy().into_owned();
        Self {
            absolute_path,
            key,
            content: None,
        }
    }

    /// A file with in-memory content (e.g. an unsaved editor buffer).
    #[must_use]
    pub fn with_content(absolute_path: impl Into<PathBuf>, content: impl Into<Arc<str>>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::on_disk(absolute_path)
        }
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    #[must_use]
    pub fn absolute_path(&self) -> &Path {
        &self.absolute_path
    }

    /// Host identity key, stable for the duration of a run.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The path as the engine expects it on the wire.
    #[must_use]
    pub fn wire_path(&self) -> String {
        self.absolute_path.to_string_lossy().into_owned()
    }

    pub fn contents(&self) -> std::io::Result<Cow<'_, str>> {
        match &self.content {
            Some(content) => Ok(Cow::Borrowed(content.as_ref())),
            None => std::fs::read_to_string(&self.absolute_path).map(Cow::Owned),
        }
    }
}

impl PartialEq for FileRef {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for FileRef {}

/// Host file system abstraction.
pub trait FileSystemView {
    /// All files selected for analysis in this run.
    fn list_input_files(&self) -> Vec<FileRef>;

    /// Resolve an absolute path reported by the engine back to a host file.
    fn resolve_by_path(&self, path: &Path) -> Option<FileRef>;
}
