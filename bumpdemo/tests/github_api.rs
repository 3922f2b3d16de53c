//! `GitHubVcs::open_pr` against a scripted `gh` executable.
//!
//! The stub records every invocation (arguments and request body) so tests
//! can assert on the exact sequence of REST calls.
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use bumpdemo::core::types::{LabelSet, PullRequestDraft};
use bumpdemo::error::RemoteErrorKind;
use bumpdemo::io::config::{Credential, RepoSlug};
use bumpdemo::io::git::Git;
use bumpdemo::io::github::GhApi;
use bumpdemo::io::process::ProcessLimits;
use bumpdemo::io::vcs::{GitHubVcs, VcsClient};

const HEAD: &str = "dependabot/pip/pydantic-2.10.0-1760000000";

const PULL: &str = concat!(
    r#"{"number":7,"title":"chore(deps): bump pydantic from 1.10.7 to 2.10.0","#,
    r#""html_url":"https://github.com/acme/demo/pull/7","#,
    r#""head":{"ref":"dependabot/pip/pydantic-2.10.0-1760000000"},"labels":[]}"#,
);

/// Write a `gh` stand-in into `dir`. Labeling pull request 7 fails with a 422
/// when `reject_labels` is set.
fn stub_gh(dir: &Path, reject_labels: bool) -> PathBuf {
    let labels = if reject_labels {
        concat!(
            "echo '{\"message\":\"Label does not exist\"}'\n",
            "    echo 'gh: Validation Failed (HTTP 422)' >&2\n",
            "    exit 1",
        )
    } else {
        "echo '[]'"
    };
    let script = format!(
        r#"#!/bin/sh
body=""
case "$*" in *"--input -"*) body=$(cat) ;; esac
printf '%s|%s\n' "$*" "$body" >> "$(dirname "$0")/calls.log"
case "$*" in
  *issues/7/labels*)
    {labels} ;;
  *"--method PATCH"*pulls/7*)
    echo '{PULL}' ;;
  *"--method POST"*pulls*)
    echo '{PULL}' ;;
  *)
    echo "gh: Not Found (HTTP 404)" >&2
    exit 1 ;;
esac
"#
    );
    let path = dir.join("gh");
    fs::write(&path, script).expect("write stub");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod stub");
    path
}

fn vcs_with(dir: &Path, program: PathBuf) -> GitHubVcs {
    let slug = RepoSlug::parse("acme/demo").expect("slug");
    let api = GhApi::new(slug, Credential::new("t0ken"), ProcessLimits::default())
        .with_program(program);
    GitHubVcs::new(Git::new(dir, "origin"), api, "main")
}

fn draft() -> PullRequestDraft {
    PullRequestDraft {
        head: HEAD.to_string(),
        base: "main".to_string(),
        title: "chore(deps): bump pydantic from 1.10.7 to 2.10.0".to_string(),
        body: "Bumps pydantic.".to_string(),
        labels: LabelSet::new(["dependencies", "automated"]),
    }
}

fn calls(dir: &Path) -> Vec<String> {
    fs::read_to_string(dir.join("calls.log"))
        .expect("read call log")
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn pull_request_is_closed_when_labeling_fails() {
    let temp = tempfile::tempdir().expect("tempdir");
    let vcs = vcs_with(temp.path(), stub_gh(temp.path(), true));

    let err = vcs.open_pr(&draft()).unwrap_err();
    assert_eq!(err.operation, "add_labels");
    assert_eq!(err.kind, RemoteErrorKind::Unknown);

    let calls = calls(temp.path());
    assert_eq!(calls.len(), 3, "{calls:#?}");
    assert!(calls[0].contains("--method POST"));
    assert!(calls[0].contains("repos/acme/demo/pulls"));
    assert!(calls[0].contains(HEAD));
    assert!(calls[1].contains("repos/acme/demo/issues/7/labels"));
    assert!(calls[2].contains("--method PATCH"));
    assert!(calls[2].contains("repos/acme/demo/pulls/7"));
    assert!(calls[2].contains(r#""state":"closed""#));
}

#[test]
fn labeled_pull_request_is_returned_open() {
    let temp = tempfile::tempdir().expect("tempdir");
    let vcs = vcs_with(temp.path(), stub_gh(temp.path(), false));

    let pr = vcs.open_pr(&draft()).expect("open pr");
    assert_eq!(pr.number, 7);
    assert_eq!(pr.head, HEAD);
    assert_eq!(pr.labels, vec!["automated", "dependencies"]);

    let calls = calls(temp.path());
    assert_eq!(calls.len(), 2, "{calls:#?}");
    assert!(calls[1].contains(r#"{"labels":["automated","dependencies"]}"#));
    assert!(calls.iter().all(|call| !call.contains("--method PATCH")));
}
