//! Test doubles and fixtures.
//!
//! [`InMemoryVcs`] models a hosting platform with separate local and remote
//! branch namespaces, so tests can tell "created" apart from "pushed".
//! [`ScratchRepo`] builds a real git working copy with a bare `origin`.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::core::types::{FileDiff, LabelSet, PullRequest, PullRequestDraft};
use crate::error::{RemoteError, RemoteErrorKind};
use crate::io::config::DemoConfig;
use crate::io::dispatch::Dispatcher;
use crate::io::git::Git;
use crate::io::vcs::VcsClient;

pub const TRUNK: &str = "main";
pub const MANIFEST: &str = "pyproject.toml";

/// Manifest pinning `pydantic==1.10.7` among unrelated dependencies.
pub const PYPROJECT: &str = r#"[project]
name = "task-api"
version = "0.1.0"
requires-python = ">=3.10"
dependencies = [
    "fastapi==0.110.0",
    "pydantic==1.10.7",
    "sqlalchemy==2.0.29",
    "uvicorn==0.29.0",
]
"#;

/// Config pointing at a fictional `acme/demo` repository.
pub fn demo_config() -> DemoConfig {
    DemoConfig {
        repository: "acme/demo".to_string(),
        ..DemoConfig::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VcsOp {
    SyncBaseline,
    ReadFile,
    CreateBranch,
    DeleteBranch,
    Commit,
    Push,
    OpenPr,
    ListPrs,
    ClosePr,
    ListBranches,
}

type Files = BTreeMap<String, String>;

#[derive(Debug, Clone)]
struct FakePr {
    pr: PullRequest,
    base: String,
    body: String,
    open: bool,
}

#[derive(Debug, Default)]
struct FakeState {
    local: BTreeMap<String, Files>,
    remote: BTreeMap<String, Files>,
    baseline: Option<String>,
    prs: Vec<FakePr>,
    commits: Vec<(String, String)>,
    scripted: Vec<(VcsOp, Option<String>, RemoteErrorKind)>,
    calls: Vec<(VcsOp, String)>,
}

/// In-memory [`VcsClient`].
#[derive(Debug, Default)]
pub struct InMemoryVcs {
    state: RefCell<FakeState>,
}

impl InMemoryVcs {
    /// Remote trunk holding `manifest` at [`MANIFEST`].
    pub fn with_manifest(manifest: &str) -> Self {
        let vcs = Self::default();
        vcs.state.borrow_mut().remote.insert(
            TRUNK.to_string(),
            Files::from([(MANIFEST.to_string(), manifest.to_string())]),
        );
        vcs
    }

    /// Fail the next call to `op` with `kind`.
    pub fn fail_next(&self, op: VcsOp, kind: RemoteErrorKind) {
        self.state.borrow_mut().scripted.push((op, None, kind));
    }

    /// Fail the next call to `op` whose target is `target`.
    pub fn fail_next_on(&self, op: VcsOp, target: &str, kind: RemoteErrorKind) {
        self.state
            .borrow_mut()
            .scripted
            .push((op, Some(target.to_string()), kind));
    }

    /// Add an open PR (and its remote head branch) created by someone else.
    pub fn seed_pr(&self, head: &str, labels: &[&str]) -> u64 {
        self.seed_remote_branch(head);
        let mut state = self.state.borrow_mut();
        let number = state.prs.len() as u64 + 1;
        state.prs.push(FakePr {
            pr: PullRequest {
                number,
                head: head.to_string(),
                title: format!("seeded {head}"),
                labels: labels.iter().map(|l| l.to_string()).collect(),
                url: None,
            },
            base: TRUNK.to_string(),
            body: String::new(),
            open: true,
        });
        number
    }

    /// Add a remote branch copied from remote trunk.
    pub fn seed_remote_branch(&self, name: &str) {
        let mut state = self.state.borrow_mut();
        let files = state.remote.get(TRUNK).cloned().unwrap_or_default();
        state.remote.insert(name.to_string(), files);
    }

    /// Remove a branch behind the orchestrator's back.
    pub fn vanish_branch(&self, name: &str) {
        let mut state = self.state.borrow_mut();
        state.remote.remove(name);
        state.local.remove(name);
    }

    pub fn open_prs(&self) -> Vec<PullRequest> {
        self.state
            .borrow()
            .prs
            .iter()
            .filter(|p| p.open)
            .map(|p| p.pr.clone())
            .collect()
    }

    pub fn pr_body(&self, number: u64) -> Option<String> {
        self.state
            .borrow()
            .prs
            .iter()
            .find(|p| p.pr.number == number)
            .map(|p| p.body.clone())
    }

    pub fn pr_base(&self, number: u64) -> Option<String> {
        self.state
            .borrow()
            .prs
            .iter()
            .find(|p| p.pr.number == number)
            .map(|p| p.base.clone())
    }

    pub fn remote_branches(&self) -> Vec<String> {
        self.state.borrow().remote.keys().cloned().collect()
    }

    pub fn local_branches(&self) -> Vec<String> {
        self.state.borrow().local.keys().cloned().collect()
    }

    pub fn remote_file(&self, branch: &str, path: &str) -> Option<String> {
        self.state.borrow().remote.get(branch)?.get(path).cloned()
    }

    /// `(branch, message)` for every commit made, in order.
    pub fn commit_messages(&self) -> Vec<(String, String)> {
        self.state.borrow().commits.clone()
    }

    pub fn calls_of(&self, op: VcsOp) -> usize {
        self.state.borrow().calls.iter().filter(|(o, _)| *o == op).count()
    }

    fn enter(&self, op: VcsOp, target: &str) -> Result<(), RemoteError> {
        let mut state = self.state.borrow_mut();
        state.calls.push((op, target.to_string()));
        let hit = state.scripted.iter().position(|(o, t, _)| {
            *o == op && t.as_deref().is_none_or(|t| t == target)
        });
        if let Some(idx) = hit {
            let (_, _, kind) = state.scripted.remove(idx);
            return Err(err(kind, op, target, "scripted failure"));
        }
        Ok(())
    }
}

fn err(kind: RemoteErrorKind, op: VcsOp, target: &str, message: &str) -> RemoteError {
    RemoteError::new(kind, format!("{op:?}"), target, message)
}

impl VcsClient for InMemoryVcs {
    fn sync_baseline(&self, trunk: &str) -> Result<(), RemoteError> {
        self.enter(VcsOp::SyncBaseline, trunk)?;
        let mut state = self.state.borrow_mut();
        let files = state
            .remote
            .get(trunk)
            .cloned()
            .ok_or_else(|| {
                err(RemoteErrorKind::NotFound, VcsOp::SyncBaseline, trunk, "no such branch")
            })?;
        state.local.insert(trunk.to_string(), files);
        state.baseline = Some(trunk.to_string());
        Ok(())
    }

    fn read_file(&self, path: &str) -> Result<String, RemoteError> {
        self.enter(VcsOp::ReadFile, path)?;
        let state = self.state.borrow();
        state
            .baseline
            .as_ref()
            .and_then(|b| state.local.get(b))
            .and_then(|files| files.get(path))
            .cloned()
            .ok_or_else(|| err(RemoteErrorKind::NotFound, VcsOp::ReadFile, path, "no such file"))
    }

    fn create_branch(&self, name: &str, from: &str) -> Result<(), RemoteError> {
        self.enter(VcsOp::CreateBranch, name)?;
        let mut state = self.state.borrow_mut();
        if state.local.contains_key(name) || state.remote.contains_key(name) {
            let message = "branch already exists";
            return Err(err(RemoteErrorKind::Conflict, VcsOp::CreateBranch, name, message));
        }
        let files = state
            .local
            .get(from)
            .cloned()
            .ok_or_else(|| {
                err(RemoteErrorKind::NotFound, VcsOp::CreateBranch, from, "no such start point")
            })?;
        state.local.insert(name.to_string(), files);
        Ok(())
    }

    fn delete_branch(&self, name: &str) -> Result<(), RemoteError> {
        self.enter(VcsOp::DeleteBranch, name)?;
        let mut state = self.state.borrow_mut();
        let local = state.local.remove(name).is_some();
        let remote = state.remote.remove(name).is_some();
        if !local && !remote {
            return Err(err(RemoteErrorKind::NotFound, VcsOp::DeleteBranch, name, "no such branch"));
        }
        Ok(())
    }

    fn commit(&self, branch: &str, message: &str, diffs: &[FileDiff]) -> Result<(), RemoteError> {
        self.enter(VcsOp::Commit, branch)?;
        let mut state = self.state.borrow_mut();
        let files = state
            .local
            .get_mut(branch)
            .ok_or_else(|| {
                err(RemoteErrorKind::NotFound, VcsOp::Commit, branch, "no such branch")
            })?;
        for diff in diffs {
            files.insert(diff.path.clone(), diff.contents.clone());
        }
        state.commits.push((branch.to_string(), message.to_string()));
        Ok(())
    }

    fn push(&self, branch: &str) -> Result<(), RemoteError> {
        self.enter(VcsOp::Push, branch)?;
        let mut state = self.state.borrow_mut();
        let files = state
            .local
            .get(branch)
            .cloned()
            .ok_or_else(|| err(RemoteErrorKind::NotFound, VcsOp::Push, branch, "no such branch"))?;
        state.remote.insert(branch.to_string(), files);
        Ok(())
    }

    fn open_pr(&self, draft: &PullRequestDraft) -> Result<PullRequest, RemoteError> {
        self.enter(VcsOp::OpenPr, &draft.head)?;
        let mut state = self.state.borrow_mut();
        if !state.remote.contains_key(&draft.head) {
            let message = "head not pushed";
            return Err(err(RemoteErrorKind::Unknown, VcsOp::OpenPr, &draft.head, message));
        }
        let number = state.prs.len() as u64 + 1;
        let pr = PullRequest {
            number,
            head: draft.head.clone(),
            title: draft.title.clone(),
            labels: draft.labels.as_slice().to_vec(),
            url: Some(format!("https://github.com/acme/demo/pull/{number}")),
        };
        state.prs.push(FakePr {
            pr: pr.clone(),
            base: draft.base.clone(),
            body: draft.body.clone(),
            open: true,
        });
        Ok(pr)
    }

    fn list_prs(&self, labels: &LabelSet) -> Result<Vec<PullRequest>, RemoteError> {
        self.enter(VcsOp::ListPrs, "")?;
        Ok(self
            .open_prs()
            .into_iter()
            .filter(|pr| labels.is_subset_of(&pr.labels))
            .collect())
    }

    fn close_pr(&self, number: u64, delete_branch: bool) -> Result<(), RemoteError> {
        let target = number.to_string();
        self.enter(VcsOp::ClosePr, &target)?;
        let mut state = self.state.borrow_mut();
        let pr = state
            .prs
            .iter_mut()
            .find(|p| p.pr.number == number && p.open)
            .ok_or_else(|| {
                err(RemoteErrorKind::NotFound, VcsOp::ClosePr, &target, "no such pull request")
            })?;
        pr.open = false;
        let head = pr.pr.head.clone();
        if delete_branch {
            state.remote.remove(&head);
            state.local.remove(&head);
        }
        Ok(())
    }

    fn list_branches(&self, prefix: &str) -> Result<Vec<String>, RemoteError> {
        self.enter(VcsOp::ListBranches, prefix)?;
        Ok(self
            .state
            .borrow()
            .remote
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// One accepted dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    pub workflow: String,
    pub git_ref: String,
    pub inputs: BTreeMap<String, String>,
}

/// [`Dispatcher`] that records requests, or rejects them all with one kind.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    sent: RefCell<Vec<Dispatched>>,
    reject: Option<RemoteErrorKind>,
}

impl RecordingDispatcher {
    pub fn failing(kind: RemoteErrorKind) -> Self {
        Self {
            sent: RefCell::default(),
            reject: Some(kind),
        }
    }

    pub fn dispatched(&self) -> Vec<Dispatched> {
        self.sent.borrow().clone()
    }
}

impl Dispatcher for RecordingDispatcher {
    fn dispatch(
        &self,
        workflow: &str,
        git_ref: &str,
        inputs: &BTreeMap<String, String>,
    ) -> Result<(), RemoteError> {
        if let Some(kind) = self.reject {
            return Err(RemoteError::new(kind, "dispatch", workflow, "rejected"));
        }
        self.sent.borrow_mut().push(Dispatched {
            workflow: workflow.to_string(),
            git_ref: git_ref.to_string(),
            inputs: inputs.clone(),
        });
        Ok(())
    }
}

/// A real git working copy cloned from a bare `origin` in a temp dir.
pub struct ScratchRepo {
    _temp: tempfile::TempDir,
    work: PathBuf,
    origin: PathBuf,
}

impl ScratchRepo {
    /// Working copy on `main` with [`PYPROJECT`] committed and pushed.
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let origin = temp.path().join("origin.git");
        let work = temp.path().join("work");
        run(temp.path(), &["git", "init", "--bare", "-b", TRUNK, "origin.git"]);
        run(temp.path(), &["git", "init", "-b", TRUNK, "work"]);
        run(&work, &["git", "config", "user.name", "Demo Bot"]);
        run(&work, &["git", "config", "user.email", "demo@example.com"]);
        run(&work, &["git", "config", "commit.gpgsign", "false"]);
        std::fs::write(work.join(MANIFEST), PYPROJECT).expect("write manifest");
        run(&work, &["git", "add", MANIFEST]);
        run(&work, &["git", "commit", "-m", "initial"]);
        let origin_url = origin.to_string_lossy().to_string();
        run(&work, &["git", "remote", "add", "origin", &origin_url]);
        run(&work, &["git", "push", "origin", TRUNK]);
        Self {
            _temp: temp,
            work,
            origin,
        }
    }

    pub fn work(&self) -> &Path {
        &self.work
    }

    pub fn git(&self) -> Git {
        Git::new(&self.work, "origin")
    }

    /// Branch names present in the bare origin.
    pub fn origin_branches(&self) -> Vec<String> {
        let out = capture(
            &self.origin,
            &["git", "for-each-ref", "--format=%(refname:short)", "refs/heads"],
        );
        out.lines().map(str::to_string).collect()
    }

    /// File contents at `branch` in the bare origin.
    pub fn origin_file(&self, branch: &str, path: &str) -> String {
        capture(&self.origin, &["git", "show", &format!("{branch}:{path}")])
    }
}

impl Default for ScratchRepo {
    fn default() -> Self {
        Self::new()
    }
}

fn run(dir: &Path, args: &[&str]) {
    let out = Command::new(args[0])
        .args(&args[1..])
        .current_dir(dir)
        .output()
        .expect("spawn");
    assert!(
        out.status.success(),
        "{args:?} failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
}

fn capture(dir: &Path, args: &[&str]) -> String {
    let out = Command::new(args[0])
        .args(&args[1..])
        .current_dir(dir)
        .output()
        .expect("spawn");
    assert!(out.status.success(), "{args:?} failed");
    String::from_utf8_lossy(&out.stdout).to_string()
}
