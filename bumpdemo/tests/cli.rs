//! CLI tests for the `bumpdemo` binary.
//!
//! Spawns the binary and verifies exit codes for configuration errors and
//! for the paths that never reach the hosting API.

use std::process::{Command, Output};

use bumpdemo::exit_codes;
use bumpdemo::test_support::ScratchRepo;

fn bumpdemo(dir: &std::path::Path, args: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_bumpdemo"));
    cmd.current_dir(dir)
        .args(args)
        .env_remove("GITHUB_TOKEN")
        .env_remove("GITHUB_REPOSITORY")
        .env_remove("RUST_LOG");
    cmd
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).to_string()
}

#[test]
fn missing_token_exits_with_config_code() {
    let temp = tempfile::tempdir().expect("tempdir");

    let out = bumpdemo(temp.path(), &["reset"])
        .env("GITHUB_REPOSITORY", "acme/demo")
        .output()
        .expect("bumpdemo reset");

    assert_eq!(out.status.code(), Some(exit_codes::CONFIG));
    assert!(stderr(&out).contains("GITHUB_TOKEN"), "stderr: {}", stderr(&out));
}

#[test]
fn missing_repository_exits_with_config_code() {
    let temp = tempfile::tempdir().expect("tempdir");

    let out = bumpdemo(temp.path(), &["status"])
        .env("GITHUB_TOKEN", "test-token")
        .output()
        .expect("bumpdemo status");

    assert_eq!(out.status.code(), Some(exit_codes::CONFIG));
    assert!(stderr(&out).contains("repository"), "stderr: {}", stderr(&out));
}

#[test]
fn malformed_config_exits_with_config_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    std::fs::write(temp.path().join("bumpdemo.toml"), "trunk = [").expect("write config");

    let out = bumpdemo(temp.path(), &["trigger"])
        .env("GITHUB_TOKEN", "test-token")
        .env("GITHUB_REPOSITORY", "acme/demo")
        .output()
        .expect("bumpdemo trigger");

    assert_eq!(out.status.code(), Some(exit_codes::CONFIG));
    assert!(stderr(&out).contains("bumpdemo.toml"), "stderr: {}", stderr(&out));
}

#[test]
fn custom_token_env_is_honored() {
    let temp = tempfile::tempdir().expect("tempdir");
    std::fs::write(temp.path().join("bumpdemo.toml"), "token_env = \"DEMO_TOKEN\"\n")
        .expect("write config");

    let out = bumpdemo(temp.path(), &["reset"])
        .env("GITHUB_TOKEN", "ignored")
        .env("GITHUB_REPOSITORY", "acme/demo")
        .env_remove("DEMO_TOKEN")
        .output()
        .expect("bumpdemo reset");

    assert_eq!(out.status.code(), Some(exit_codes::CONFIG));
    assert!(stderr(&out).contains("DEMO_TOKEN"), "stderr: {}", stderr(&out));
}

#[test]
fn stale_baseline_exits_with_precondition_code() {
    let repo = ScratchRepo::new();

    let out = bumpdemo(repo.work(), &["simulate", "--from", "1.9.0"])
        .env("GITHUB_TOKEN", "test-token")
        .env("GITHUB_REPOSITORY", "acme/demo")
        .output()
        .expect("bumpdemo simulate");

    assert_eq!(out.status.code(), Some(exit_codes::PRECONDITION));
    assert!(stderr(&out).contains("1.10.7"), "stderr: {}", stderr(&out));
    assert_eq!(repo.origin_branches(), vec!["main".to_string()]);
}

#[test]
fn dry_run_simulate_leaves_origin_untouched() {
    let repo = ScratchRepo::new();

    let out = bumpdemo(repo.work(), &["simulate", "--dry-run", "--json"])
        .env("GITHUB_TOKEN", "test-token")
        .env("GITHUB_REPOSITORY", "acme/demo")
        .output()
        .expect("bumpdemo simulate");

    assert_eq!(out.status.code(), Some(exit_codes::OK), "stderr: {}", stderr(&out));
    let run: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json output");
    assert_eq!(run["status"], "created");
    assert_eq!(run["package"], "pydantic");
    assert!(
        run["branch_name"]
            .as_str()
            .is_some_and(|b| b.starts_with("dependabot/pip/pydantic-2.10.0-"))
    );
    assert_eq!(repo.origin_branches(), vec!["main".to_string()]);
}
