//! One-shot analysis through the `analyze` command.

use std::path::Path;

use crate::common::{Project, fake_runtime, stderr, stdout};

fn configure(project: &Project, runtime_version: &str, runner_body: &str) {
    let runtime = fake_runtime(project.root(), runtime_version, Path::new("/bin/sh"));
    project.write("runner.sh", runner_body);
    project.write(
        "lintbridge.toml",
        &format!(
            "[runtime]\nexecutable = \"{}\"\nprobe_timeout_ms = 5000\n\n[engine]\nrunner = \"runner.sh\"\n",
            runtime.display()
        ),
    );
}

/// A runner that swallows the request and answers with one issue for `file`.
fn answering_runner(file: &Path) -> String {
    let response = serde_json::json!([{
        "filepath": file.display().to_string(),
        "issues": [{
            "failure": "Correct one of the identical sub-expressions on both sides of operator \"==\"",
            "startPosition": { "line": 1, "character": 4 },
            "endPosition": { "line": 1, "character": 10 },
            "name": file.display().to_string(),
            "ruleName": "no-identical-expressions"
        }],
        "ncloc": [1, 2],
        "functions": 0,
        "statements": 2
    }]);
    format!("cat > /dev/null\ncat <<'JSON'\n{response}\nJSON\n")
}

#[test]
fn analyze_reports_issues_as_json() {
    let project = Project::new();
    let file = project.write("src/a.ts", "let a = 1;\nif (a == a) {}\n");
    configure(&project, "v18.17.0", &answering_runner(&file));

    let output = project.run(&["analyze", "--format", "json"]);
    assert!(output.status.success(), "{}", stderr(&output));

    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let report = &json["files"]["src/a.ts"];
    assert_eq!(report["issues"][0]["rule_key"], "S1764");
    assert_eq!(report["metrics"]["statements"], 2);
    assert_eq!(json["summary"]["files"], 1);
    assert_eq!(json["summary"]["fallback_files"], 1);
    assert_eq!(json["summary"]["failed_units"], serde_json::json!([]));
}

#[test]
fn analyze_prints_one_line_per_issue() {
    let project = Project::new();
    let file = project.write("src/a.ts", "let a = 1;\nif (a == a) {}\n");
    configure(&project, "v18.17.0", &answering_runner(&file));

    let output = project.run(&["analyze"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).starts_with("src/a.ts:"), "{}", stdout(&output));
    assert!(stdout(&output).contains("[S1764]"));
}

#[test]
fn empty_engine_output_fails_the_unit_but_not_the_run() {
    let project = Project::new();
    project.write("src/a.ts", "let a = 1;\n");
    configure(&project, "v18.17.0", "cat > /dev/null\nexit 0\n");

    let output = project.run(&["analyze", "--format", "json"]);
    assert_eq!(output.status.code(), Some(2), "{}", stderr(&output));

    let logs = stderr(&output);
    assert!(logs.contains("returned an empty output"), "{logs}");
    assert!(logs.contains("Not analyzed due to a previous error: src/a.ts"), "{logs}");
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["summary"]["failed_units"], serde_json::json!(["no-config"]));
}

#[test]
fn unconfigured_files_are_summarized_once() {
    let project = Project::new();
    project.write("proj/tsconfig.json", "{}");
    project.write("proj/a.ts", "let a = 1;\n");
    project.write("b/c.ts", "let c = 1;\n");
    project.write("b/d.ts", "let d = 1;\n");
    configure(&project, "v18.17.0", "cat > /dev/null\necho '[]'\n");

    let output = project.run(&["analyze", "--format", "json"]);
    assert!(output.status.success(), "{}", stderr(&output));

    let logs = stderr(&output);
    assert_eq!(logs.matches("were not matched to any tsconfig.json").count(), 1, "{logs}");
    assert!(logs.contains("2 file(s) were not matched"), "{logs}");
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["summary"]["units"], 2);
    assert_eq!(json["summary"]["fallback_files"], 2);
}

#[test]
fn issue_for_unknown_rule_is_skipped_with_a_warning() {
    let project = Project::new();
    let file = project.write("src/a.ts", "let a = 1\n");
    let runner = answering_runner(&file).replace("no-identical-expressions", "semicolon");
    configure(&project, "v18.17.0", &runner);

    let output = project.run(&["analyze", "--format", "json"]);
    assert!(output.status.success(), "{}", stderr(&output));

    let logs = stderr(&output);
    assert!(logs.contains("WARN"), "{logs}");
    assert!(logs.contains("Unknown rule name 'semicolon'"), "{logs}");
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["files"]["src/a.ts"]["issues"], serde_json::json!([]));
}

#[test]
fn rejected_source_file_gets_an_exclusion_hint() {
    let project = Project::new();
    project.write("src/a.ts", "let a = 1;\n");
    configure(
        &project,
        "v18.17.0",
        "cat > /dev/null\n\
         echo 'Invalid source file: /p/gen/a.ts. Ensure that the files supplied are included' >&2\n\
         exit 0\n",
    );

    let output = project.run(&["analyze"]);
    assert_eq!(output.status.code(), Some(2), "{}", stderr(&output));
    let logs = stderr(&output);
    assert!(
        logs.contains(
            "Probably `/p/gen/a.ts` is excluded in your tsconfig.json, in this case exclude it from the analysis as well."
        ),
        "{logs}"
    );
}

#[test]
fn old_runtime_aborts_before_any_unit() {
    let project = Project::new();
    project.write("src/a.ts", "let a = 1;\n");
    let marker = project.root().join("launched");
    configure(
        &project,
        "v4.2.0",
        &format!("touch {}\ncat > /dev/null\n", marker.display()),
    );

    let output = project.run(&["analyze"]);
    assert_eq!(output.status.code(), Some(1), "{}", stderr(&output));
    assert!(!marker.exists());
    assert!(stdout(&output).is_empty());
}

#[test]
fn missing_runner_setting_is_fatal() {
    let project = Project::new();
    project.write("src/a.ts", "let a = 1;\n");
    project.write("lintbridge.toml", "[runtime]\nexecutable = \"node\"\n");

    let output = project.run(&["analyze"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("engine.runner"), "{}", stderr(&output));
}
