//! Fake engines for tests: small shell scripts standing in for the runtime.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// A runtime that answers `-v` with `version` and otherwise drops the heap
/// flag and runs the entrypoint with `/bin/sh`.
pub(crate) fn fake_runtime(dir: &Path, version: &str) -> PathBuf {
    fake_runtime_for(dir, version, Path::new("/bin/sh"))
}

/// Like [`fake_runtime`], running the entrypoint with `interpreter`.
pub(crate) fn fake_runtime_for(dir: &Path, version: &str, interpreter: &Path) -> PathBuf {
    let path = dir.join("fake-node");
    let script = format!(
        "#!/bin/sh\nif [ \"$1\" = \"-v\" ]; then echo {version}; exit 0; fi\nshift\nexec {} \"$@\"\n",
        interpreter.display()
    );
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Write an entrypoint script for the fake runtime to run.
pub(crate) fn engine_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
}
