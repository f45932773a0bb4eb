//! End-to-end tests for the `codefacts` binary.

#![cfg(feature = "tree-sitter")]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn testdata_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata")
}

fn run(args: &[&str], cwd: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_codefacts"))
        .args(args)
        .current_dir(cwd)
        .env("NO_COLOR", "1")
        .env_remove("CODEFACTS_LOG")
        .output()
        .expect("binary should run")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

fn copy_fixture(dir: &Path, fixture: &str) -> PathBuf {
    let name = Path::new(fixture).file_name().unwrap();
    let dest = dir.join(name);
    std::fs::copy(testdata_path().join(fixture), &dest).unwrap();
    dest
}

#[test]
fn test_json_facts_for_directory() {
    let dir = tempfile::tempdir().unwrap();
    copy_fixture(dir.path(), "java/HelloWorld.java");
    copy_fixture(dir.path(), "mixed/service.go");
    copy_fixture(dir.path(), "mixed/notes.txt");

    let output = run(&["--format", "json", "--no-progress", "."], dir.path());
    assert_eq!(output.status.code(), Some(0));

    let report = stdout_json(&output);
    assert_eq!(report["files_scanned"], 2);
    assert_eq!(report["files_with_syntax_errors"], 0);

    let files = report["files"].as_array().unwrap();
    let java = files
        .iter()
        .find(|f| f["path"].as_str().unwrap().ends_with("HelloWorld.java"))
        .unwrap();
    assert_eq!(java["language"], "java");
    assert_eq!(java["classes"], serde_json::json!(["HelloWorld"]));
    assert_eq!(java["methods"], serde_json::json!(["main", "greet"]));

    let go = files
        .iter()
        .find(|f| f["path"].as_str().unwrap().ends_with("service.go"))
        .unwrap();
    assert_eq!(go["package"], "service");
}

#[test]
fn test_fail_on_syntax_errors() {
    let dir = tempfile::tempdir().unwrap();
    let broken = copy_fixture(dir.path(), "java/Broken.java");
    let broken = broken.to_str().unwrap();

    let output = run(&["--format", "json", broken], dir.path());
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout_json(&output)["files_with_syntax_errors"], 1);

    let output = run(&["--fail-on-syntax-errors", broken], dir.path());
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stdout).contains("syntax errors"));
}

#[test]
fn test_usage_errors_exit_with_two() {
    let dir = tempfile::tempdir().unwrap();

    let output = run(&["--format", "xml", "."], dir.path());
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid format"));

    let output = run(&["--language", "cobol", "."], dir.path());
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("cobol"));

    let output = run(&["does-not-exist"], dir.path());
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_ad_hoc_query() {
    let dir = tempfile::tempdir().unwrap();
    let file = copy_fixture(dir.path(), "java/Inventory.java");

    let output = run(
        &[
            "--format",
            "json",
            "--query",
            "(method_declaration name: (identifier) @method)",
            file.to_str().unwrap(),
        ],
        dir.path(),
    );
    assert_eq!(output.status.code(), Some(0));

    let rows = stdout_json(&output);
    let names: Vec<&str> = rows
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["text"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["add", "add", "log"]);
    assert_eq!(rows[0]["capture"], "method");
    assert_eq!(rows[0]["kind"], "identifier");

    let output = run(
        &["--query", "(no_such_kind) @x", file.to_str().unwrap()],
        dir.path(),
    );
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown node kind"));
}

#[test]
fn test_config_limits_apply() {
    let dir = tempfile::tempdir().unwrap();
    let file = copy_fixture(dir.path(), "java/Inventory.java");
    std::fs::write(dir.path().join("codefacts.yaml"), "max_tree_depth: 4\n").unwrap();

    let output = run(&["--format", "json", file.to_str().unwrap()], dir.path());
    assert_eq!(output.status.code(), Some(0));
    let report = stdout_json(&output);
    assert_eq!(report["files_scanned"], 0);
    let reason = report["skipped"][0]["reason"].as_str().unwrap();
    assert!(reason.contains("maximum depth of 4"), "{}", reason);
}

#[test]
fn test_tree_output() {
    let dir = tempfile::tempdir().unwrap();
    let file = copy_fixture(dir.path(), "mixed/models.py");

    let output = run(&["--tree", file.to_str().unwrap()], dir.path());
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("(module"));
    assert!(stdout.contains("class_definition"));
}
