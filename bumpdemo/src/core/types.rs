//! Shared deterministic types for demo orchestration.
//!
//! These types carry no handles to remote state. Branches and pull requests are
//! referred to by name/number only; the platform stays the source of truth.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a single demo run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Created,
    Pushed,
    PrOpened,
    Reconciled,
    Failed,
}

impl RunStatus {
    /// Whether `self -> next` is a legal transition.
    ///
    /// `Created -> Pushed -> PrOpened -> Reconciled` is the forward path, and
    /// only `Created` or `Pushed` may fall into `Failed`.
    pub fn can_transition(self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Created, RunStatus::Pushed)
                | (RunStatus::Pushed, RunStatus::PrOpened)
                | (RunStatus::PrOpened, RunStatus::Reconciled)
                | (RunStatus::Created, RunStatus::Failed)
                | (RunStatus::Pushed, RunStatus::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Created => "created",
            RunStatus::Pushed => "pushed",
            RunStatus::PrOpened => "pr_opened",
            RunStatus::Reconciled => "reconciled",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One attempt at manufacturing the simulated upgrade PR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoRun {
    pub branch_name: String,
    pub package: String,
    pub old_version: String,
    pub new_version: String,
    pub status: RunStatus,
    /// Pull request number, once opened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
}

impl DemoRun {
    pub fn new(branch_name: String, package: &str, old_version: &str, new_version: &str) -> Self {
        Self {
            branch_name,
            package: package.to_string(),
            old_version: old_version.to_string(),
            new_version: new_version.to_string(),
            status: RunStatus::Created,
            pr_number: None,
            pr_url: None,
        }
    }

    /// Move to `next`, refusing illegal transitions.
    ///
    /// Returns `false` (and leaves the status untouched) when the transition is
    /// not allowed.
    pub fn advance(&mut self, next: RunStatus) -> bool {
        if !self.status.can_transition(next) {
            return false;
        }
        self.status = next;
        true
    }
}

/// Labels that mark orchestrator-created pull requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSet(Vec<String>);

impl LabelSet {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        labels.sort();
        labels.dedup();
        Self(labels)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when every label in the set is present in `labels`.
    pub fn is_subset_of<S: AsRef<str>>(&self, labels: &[S]) -> bool {
        self.0
            .iter()
            .all(|want| labels.iter().any(|have| have.as_ref() == want))
    }
}

impl Default for LabelSet {
    fn default() -> Self {
        Self::new(["dependencies", "automated"])
    }
}

/// A full-content replacement for one file in a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    /// Path relative to the repository root.
    pub path: String,
    pub contents: String,
}

/// Everything needed to open a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestDraft {
    pub head: String,
    pub base: String,
    pub title: String,
    pub body: String,
    pub labels: LabelSet,
}

/// An open pull request as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub head: String,
    pub title: String,
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}
