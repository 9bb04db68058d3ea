//! Single-file analysis through the persistent engine server.

use crate::common::{Project, fake_runtime, stderr, stdout};

/// Connects back on the port given as `$1` and answers every framed request
/// with one issue. Needs bash for `/dev/tcp`.
const ISSUE_SERVER: &str = r#"exec 3<>"/dev/tcp/127.0.0.1/$1"
while true; do
  len=
  while IFS= read -r line <&3; do
    line="${line%$'\r'}"
    [ -z "$line" ] && break
    case "$line" in
      Content-Length:*) len="${line#Content-Length: }" ;;
    esac
  done
  [ -z "$len" ] && exit 0
  head -c "$len" <&3 > /dev/null
  resp='{"filepath":"a.ts","issues":[{"failure":"Too many parameters","startPosition":{"line":0,"character":9},"endPosition":{"line":0,"character":12},"name":"a.ts","ruleName":"parameters-max-number"}]}'
  printf 'Content-Length: %d\r\n\r\n%s' "${#resp}" "$resp" >&3
done
"#;

#[test]
fn serve_file_reports_each_file() {
    let Ok(bash) = which_bash() else {
        return;
    };
    let project = Project::new();
    let runtime = fake_runtime(project.root(), "v20.1.0", &bash);
    project.write("server.sh", ISSUE_SERVER);
    project.write(
        "lintbridge.toml",
        &format!(
            "[runtime]\nexecutable = \"{}\"\n\n[engine]\nserver = \"server.sh\"\n\n[server]\nreadiness_timeout_ms = 5000\n",
            runtime.display()
        ),
    );
    let a = project.write("a.ts", "function f(a, b, c, d, e, f, g, h) {}\n");
    let b = project.write("b.ts", "function g(a, b, c, d, e, f, g, h) {}\n");

    let output = project.run(&[
        "serve-file",
        a.to_str().unwrap(),
        b.to_str().unwrap(),
        "--format",
        "json",
    ]);
    assert!(output.status.success(), "{}", stderr(&output));

    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["files"]["a.ts"]["issues"][0]["rule_key"], "S107");
    assert_eq!(json["files"]["b.ts"]["issues"][0]["rule_key"], "S107");
    assert!(stderr(&output).contains("Engine server is stopped"));
}

#[test]
fn server_that_exits_early_is_fatal() {
    let project = Project::new();
    let runtime = fake_runtime(project.root(), "v20.1.0", std::path::Path::new("/bin/sh"));
    project.write("server.sh", "exit 3\n");
    project.write(
        "lintbridge.toml",
        &format!(
            "[runtime]\nexecutable = \"{}\"\n\n[engine]\nserver = \"server.sh\"\n",
            runtime.display()
        ),
    );
    let a = project.write("a.ts", "let a = 1;\n");

    let output = project.run(&["serve-file", a.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(
        stderr(&output).contains("Failed to start engine server"),
        "{}",
        stderr(&output)
    );
}

fn which_bash() -> Result<std::path::PathBuf, ()> {
    ["/bin/bash", "/usr/bin/bash"]
        .into_iter()
        .map(std::path::PathBuf::from)
        .find(|path| path.exists())
        .ok_or(())
}
