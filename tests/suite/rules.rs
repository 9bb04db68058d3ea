//! The `rules` listing.

use crate::common::{Project, stderr, stdout};

fn line_for<'a>(listing: &'a str, key: &str) -> &'a str {
    listing
        .lines()
        .find(|line| line.split_whitespace().next() == Some(key))
        .unwrap_or_else(|| panic!("no line for {key} in:\n{listing}"))
}

#[test]
fn lists_defaults_without_configuration() {
    let project = Project::new();
    let output = project.run(&["rules"]);
    assert!(output.status.success(), "{}", stderr(&output));

    let listing = stdout(&output);
    assert!(line_for(&listing, "S107").contains(" active"));
    assert!(line_for(&listing, "S107").contains("[7]"));
    assert!(line_for(&listing, "S104").contains("inactive"));
}

#[test]
fn configuration_overrides_activation_and_arguments() {
    let project = Project::new();
    project.write(
        "lintbridge.toml",
        "[rules]\nenabled = [\"S104\"]\ndisabled = [\"S1764\"]\n\n[rules.arguments]\nS104 = [500]\n",
    );

    let output = project.run(&["rules"]);
    assert!(output.status.success(), "{}", stderr(&output));

    let listing = stdout(&output);
    assert!(line_for(&listing, "S104").contains("[500]"));
    assert!(!line_for(&listing, "S104").contains("inactive"));
    assert!(line_for(&listing, "S1764").contains("inactive"));
}
