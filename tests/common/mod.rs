//! Shared test utilities and fixtures
//!
//! A fake runtime (a shell script answering the version probe) plus helpers
//! to lay out a project and run the binary against it.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// A project directory with a `lintbridge.toml` at its root.
pub struct Project {
    dir: tempfile::TempDir,
    root: PathBuf,
}

impl Project {
    pub fn new() -> Self {
        let dir = tempfile::Builder::new()
            .prefix("lintbridge-it")
            .tempdir()
            .unwrap();
        let root = dir.path().canonicalize().unwrap();
        Self { dir, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_lintbridge"))
            .args(args)
            .arg("--project")
            .arg(&self.root)
            .env("RUST_LOG", "info")
            .env("HOME", &self.root)
            .env_remove("NODE_PATH")
            .output()
            .unwrap()
    }
}

/// A runtime that answers `-v` with `version`, otherwise drops the heap
/// flag and runs the entrypoint with `interpreter`.
#[cfg(unix)]
pub fn fake_runtime(dir: &Path, version: &str, interpreter: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-node");
    let script = format!(
        "#!/bin/sh\nif [ \"$1\" = \"-v\" ]; then echo {version}; exit 0; fi\nshift\nexec {} \"$@\"\n",
        interpreter.display()
    );
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
