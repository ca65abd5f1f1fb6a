//! CLI tests: spawn the `genloop` binary and check exit codes and output.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use genloop::exit_codes;
use genloop::io::config::{ExecutionMode, PipelineConfig, write_config};
use genloop::io::json_store::write_json;
use genloop::test_support::{bundle_with, sample_artifacts, sample_docs, unit};
use serde_json::Value;

fn genloop(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_genloop"))
        .current_dir(dir)
        .args(args)
        .output()
        .expect("spawn genloop")
}

#[test]
fn classify_reports_build_failures_as_configuration_errors() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(
        temp.path().join("build.log"),
        "#5 ERROR: failed to solve: python:3.99: not found\n",
    )
    .expect("write log");

    let output = genloop(
        temp.path(),
        &[
            "classify",
            "--source",
            "container-build",
            "--exit-code",
            "1",
            "build.log",
        ],
    );

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let record: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(record["category"], "ConfigurationError");
}

#[test]
fn classify_prints_null_for_clean_runtime_logs() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("app.log"), "Hello, World!\n").expect("write log");

    let output = genloop(
        temp.path(),
        &["classify", "--source", "container-runtime", "app.log"],
    );

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "null");
}

#[test]
fn validate_rejects_bundle_with_two_entry_points() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_json(
        &temp.path().join("bundle.json"),
        &bundle_with(vec![unit("a.py", true), unit("b.py", true)]),
    )
    .expect("write bundle");

    let output = genloop(temp.path(), &["validate", "bundle.json"]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("exactly one is required"));
}

#[test]
fn init_writes_default_config() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = genloop(temp.path(), &["init"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let contents = fs::read_to_string(temp.path().join("genloop.toml")).expect("config");
    assert!(contents.contains("max_iterations = 3"));
}

/// Write canned agent responses plus a config whose agent command copies
/// the response for the role named by the per-call directory.
#[cfg(unix)]
fn setup_agent(dir: &Path, entry_code: &str, max_iterations: u32) {
    let fixtures = dir.join("fixtures");
    fs::create_dir_all(&fixtures).expect("fixtures dir");
    let mut entry = unit("main.sh", true);
    entry.code = entry_code.to_string();
    entry.language = "sh".to_string();
    let mut bundle = bundle_with(vec![entry]);
    bundle.execution_command = "sh main.sh".to_string();
    write_json(&fixtures.join("generate.json"), &bundle).expect("generate fixture");
    write_json(&fixtures.join("repair_code.json"), &bundle).expect("repair fixture");
    write_json(&fixtures.join("containerize.json"), &sample_artifacts())
        .expect("containerize fixture");
    write_json(&fixtures.join("document.json"), &sample_docs()).expect("document fixture");

    // Appended arguments: --output-schema S --output-last-message O -
    let script = format!(
        "cat >/dev/null; role=$(basename \"$(dirname \"$4\")\"); cp \"{}/${{role#*-}}.json\" \"$4\"",
        fixtures.display()
    );
    let cfg = PipelineConfig {
        max_iterations,
        execution_mode: ExecutionMode::Direct,
        command_timeout_secs: 30,
        agent: genloop::io::config::AgentConfig {
            command: vec![
                "sh".to_string(),
                "-c".to_string(),
                script,
                "agent".to_string(),
            ],
            ..Default::default()
        },
        ..PipelineConfig::default()
    };
    write_config(&dir.join("genloop.toml"), &cfg).expect("write config");
}

#[cfg(unix)]
#[test]
fn run_direct_mode_produces_documented_project() {
    let temp = tempfile::tempdir().expect("tempdir");
    setup_agent(temp.path(), "echo 'Hello, World!'\n", 3);

    let output = genloop(
        temp.path(),
        &["run", "Shell hello world program", "--output", "hello"],
    );

    assert_eq!(
        output.status.code(),
        Some(exit_codes::OK),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let project = temp.path().join("hello");
    assert!(project.join("src/main.sh").is_file());
    assert!(project.join("Dockerfile").is_file());
    assert!(project.join("README.md").is_file());
    assert!(project.join(".genloop/agents/001-generate/prompt.md").is_file());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("success:"));
}

#[cfg(unix)]
#[test]
fn run_exits_with_gave_up_code_when_program_keeps_failing() {
    let temp = tempfile::tempdir().expect("tempdir");
    setup_agent(temp.path(), "echo 'boom' >&2\nexit 3\n", 1);

    let output = genloop(temp.path(), &["run", "Failing program", "--output", "broken"]);

    assert_eq!(output.status.code(), Some(exit_codes::GAVE_UP));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ExecutionError"), "stdout: {stdout}");
    let outcome: Value = serde_json::from_str(
        &fs::read_to_string(temp.path().join("broken/.genloop/outcome.json")).expect("outcome"),
    )
    .expect("json");
    assert_eq!(outcome["iteration_count"], 1);
}
