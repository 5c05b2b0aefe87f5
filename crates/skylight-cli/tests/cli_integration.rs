//! Integration tests for the `skylight` binary.
//!
//! These run without libskylight installed, so they cover config handling
//! and the failure paths of commands that need the library.

use std::io::Write;
use std::process::{Command, Output};

fn skylight(args: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_skylight"));
    // Keep stray SKYLIGHT_* variables of the test environment out.
    cmd.env_clear().args(args);
    cmd
}

fn run(cmd: &mut Command) -> Output {
    cmd.output().expect("failed to run skylight")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_env_without_config() {
    let output = run(&mut skylight(&["env"]));
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("No SKYLIGHT_* settings configured."));
}

#[test]
fn test_env_from_config_and_environment() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "[env]\nSKYLIGHT_VERSION = \"5.0.0\"\nSKYLIGHT_AUTHENTICATION = \"from-file\"\n"
    )
    .unwrap();

    let path = file.path().to_str().unwrap();
    let output = run(skylight(&["--config", path, "env"])
        .env("SKYLIGHT_AUTHENTICATION", "from-env")
        .env("UNRELATED", "x"));
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let lines: Vec<String> = stdout(&output).lines().map(str::to_string).collect();
    assert_eq!(
        lines,
        vec![
            "SKYLIGHT_AUTHENTICATION=from-env".to_string(),
            "SKYLIGHT_VERSION=5.0.0".to_string(),
        ]
    );
}

#[test]
fn test_env_prints_resolved_config_as_toml() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[env]\nSKYLIGHT_VERSION = \"5.0.0\"\n").unwrap();

    let path = file.path().to_str().unwrap();
    let output = run(skylight(&["--config", path, "env", "--toml"])
        .env("SKYLIGHT_LIB_PATH", "/opt/skylight/libskylight.so"));
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let out = stdout(&output);
    assert!(out.contains("library_path = \"/opt/skylight/libskylight.so\""), "stdout: {}", out);
    assert!(out.contains("[env]"), "stdout: {}", out);
    assert!(out.contains("SKYLIGHT_VERSION = \"5.0.0\""), "stdout: {}", out);
    assert!(!out.contains("SKYLIGHT_LIB_PATH"), "stdout: {}", out);
}

#[test]
fn test_invalid_config_fails() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[env]\n\"BAD=KEY\" = \"x\"\n").unwrap();

    let path = file.path().to_str().unwrap();
    let output = run(&mut skylight(&["--config", path, "env"]));
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Failed to load config"));
}

#[test]
fn test_load_without_library_path() {
    let output = run(&mut skylight(&["load"]));
    assert!(!output.status.success());
    assert!(stderr(&output).contains("No libskylight path configured"));
}

#[test]
fn test_load_missing_library() {
    let output = run(&mut skylight(&["--lib", "/nonexistent/libskylight.so", "hrtime"]));
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("Could not load libskylight"), "stderr: {}", err);
    assert!(err.contains("Library not found"), "stderr: {}", err);
}

#[test]
fn test_lib_path_from_environment() {
    let output = run(skylight(&["lex-sql", "SELECT 1"])
        .env("SKYLIGHT_LIB_PATH", "/nonexistent/from-env.so"));
    assert!(!output.status.success());
    assert!(stderr(&output).contains("/nonexistent/from-env.so"));
}
