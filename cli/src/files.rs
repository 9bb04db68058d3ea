//! Input file discovery on the local disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use lintbridge_types::{FileRef, FileSystemView};

/// Directories never worth walking into.
const SKIPPED_DIRS: &[&str] = &[".git", "node_modules"];

/// Files selected for one run, addressable by absolute path.
pub struct LocalFileSystem {
    files: Vec<FileRef>,
    by_path: HashMap<PathBuf, usize>,
}

impl LocalFileSystem {
    /// Walk `root` for files with one of `extensions`.
    ///
    /// Hidden entries are skipped; `.gitignore` rules apply when
    /// `respect_gitignore` is set. Files come back in path order.
    pub fn scan(root: &Path, extensions: &[String], respect_gitignore: bool) -> Self {
        let mut builder = WalkBuilder::new(root);
        builder.hidden(true);
        builder.git_ignore(respect_gitignore);
        builder.git_global(respect_gitignore);
        builder.git_exclude(respect_gitignore);
        builder.ignore(respect_gitignore);
        builder.filter_entry(|entry| {
            !SKIPPED_DIRS
                .iter()
                .any(|skipped| entry.file_name() == *skipped)
        });
        builder.sort_by_file_path(|a, b| a.cmp(b));

        let mut paths = Vec::new();
        for entry in builder.build() {
            match entry {
                Ok(entry) => {
                    if !entry.file_type().is_some_and(|t| t.is_file()) {
                        continue;
                    }
                    if has_extension(entry.path(), extensions) {
                        paths.push(entry.into_path());
                    }
                }
                Err(e) => tracing::warn!("Skipping unreadable entry: {e}"),
            }
        }
        tracing::debug!(root = %root.display(), "Selected {} file(s)", paths.len());
        Self::from_paths(paths, Some(root))
    }

    /// Files keyed by their path relative to `root` when they live under it.
    pub fn from_paths(paths: impl IntoIterator<Item = PathBuf>, root: Option<&Path>) -> Self {
        let files: Vec<FileRef> = paths
            .into_iter()
            .map(|path| {
                let key = root
                    .and_then(|root| path.strip_prefix(root).ok())
                    .map(|relative| relative.to_string_lossy().into_owned());
                let file = FileRef::on_disk(path);
                match key {
                    Some(key) => file.with_key(key),
                    None => file,
                }
            })
            .collect();
        let by_path = files
            .iter()
            .enumerate()
            .map(|(index, file)| (file.absolute_path().to_path_buf(), index))
            .collect();
        Self { files, by_path }
    }

    pub fn files(&self) -> &[FileRef] {
        &self.files
    }
}

impl FileSystemView for LocalFileSystem {
    fn list_input_files(&self) -> Vec<FileRef> {
        self.files.clone()
    }

    fn resolve_by_path(&self, path: &Path) -> Option<FileRef> {
        self.by_path.get(path).map(|&index| self.files[index].clone())
    }
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|wanted| wanted.eq_ignore_ascii_case(ext)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "let x = 1;\n").unwrap();
    }

    #[test]
    fn scan_selects_by_extension_and_skips_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(&root.join("src/b.ts"));
        write(&root.join("src/a.tsx"));
        write(&root.join("src/readme.md"));
        write(&root.join("node_modules/pkg/index.ts"));
        write(&root.join(".cache/c.ts"));

        let extensions = vec!["ts".to_string(), "tsx".to_string()];
        let fs = LocalFileSystem::scan(root, &extensions, true);
        let paths: Vec<_> = fs.files().iter().map(|f| f.absolute_path().to_path_buf()).collect();
        assert_eq!(paths, vec![root.join("src/a.tsx"), root.join("src/b.ts")]);
    }

    #[test]
    fn resolves_only_selected_paths() {
        let fs = LocalFileSystem::from_paths([PathBuf::from("/p/a.ts")], Some(Path::new("/p")));
        let resolved = fs.resolve_by_path(Path::new("/p/a.ts")).unwrap();
        assert_eq!(resolved.key(), "a.ts");
        assert!(fs.resolve_by_path(Path::new("/p/b.ts")).is_none());
        assert_eq!(fs.list_input_files().len(), 1);
    }
}
