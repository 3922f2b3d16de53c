//! Version-control capability used by the orchestrator.
//!
//! [`VcsClient`] is the seam between orchestration and the platform. The
//! production [`GitHubVcs`] combines a local git working copy (branches,
//! commits, pushes) with the REST API (pull requests, labels). Tests swap in
//! an in-memory fake.

use std::fs;
use std::io::ErrorKind;

use tracing::{debug, instrument, warn};

use crate::core::types::{FileDiff, LabelSet, PullRequest, PullRequestDraft};
use crate::error::{RemoteError, RemoteErrorKind};
use crate::io::git::Git;
use crate::io::github::GhApi;

/// Operations the orchestrator needs from the hosting platform.
pub trait VcsClient {
    /// Bring the local baseline in line with the remote `trunk`.
    fn sync_baseline(&self, trunk: &str) -> Result<(), RemoteError>;

    /// Read a file from the synced baseline.
    fn read_file(&self, path: &str) -> Result<String, RemoteError>;

    /// Create `name` at `from`. `Conflict` if the name is already taken.
    fn create_branch(&self, name: &str, from: &str) -> Result<(), RemoteError>;

    /// Delete `name` locally and remotely. `NotFound` if it existed nowhere.
    fn delete_branch(&self, name: &str) -> Result<(), RemoteError>;

    fn commit(&self, branch: &str, message: &str, diffs: &[FileDiff]) -> Result<(), RemoteError>;

    fn push(&self, branch: &str) -> Result<(), RemoteError>;

    /// Open a pull request and apply `draft.labels`.
    fn open_pr(&self, draft: &PullRequestDraft) -> Result<PullRequest, RemoteError>;

    /// Open pull requests carrying every label in `labels`.
    fn list_prs(&self, labels: &LabelSet) -> Result<Vec<PullRequest>, RemoteError>;

    /// Close a pull request, optionally deleting its head branch.
    fn close_pr(&self, number: u64, delete_branch: bool) -> Result<(), RemoteError>;

    /// Remote branch names starting with `prefix`.
    fn list_branches(&self, prefix: &str) -> Result<Vec<String>, RemoteError>;
}

/// GitHub-backed [`VcsClient`].
#[derive(Debug, Clone)]
pub struct GitHubVcs {
    git: Git,
    api: GhApi,
    trunk: String,
}

impl GitHubVcs {
    pub fn new(git: Git, api: GhApi, trunk: impl Into<String>) -> Self {
        Self {
            git,
            api,
            trunk: trunk.into(),
        }
    }
}

impl VcsClient for GitHubVcs {
    fn sync_baseline(&self, trunk: &str) -> Result<(), RemoteError> {
        self.git.sync_trunk(trunk)
    }

    fn read_file(&self, path: &str) -> Result<String, RemoteError> {
        let full = self.git.workdir().join(path);
        fs::read_to_string(&full).map_err(|err| {
            let kind = if err.kind() == ErrorKind::NotFound {
                RemoteErrorKind::NotFound
            } else {
                RemoteErrorKind::Unknown
            };
            RemoteError::new(kind, "read_file", path, err.to_string())
        })
    }

    fn create_branch(&self, name: &str, from: &str) -> Result<(), RemoteError> {
        self.git.create_branch(name, from)
    }

    #[instrument(skip_all, fields(branch = name))]
    fn delete_branch(&self, name: &str) -> Result<(), RemoteError> {
        let local = self.git.delete_local_branch(name, &self.trunk)?;
        match self.git.delete_remote_branch(name) {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() && local => {
                debug!(branch = name, "branch was local only");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn commit(&self, branch: &str, message: &str, diffs: &[FileDiff]) -> Result<(), RemoteError> {
        self.git.checkout(branch)?;
        for diff in diffs {
            let full = self.git.workdir().join(&diff.path);
            fs::write(&full, &diff.contents).map_err(|err| {
                RemoteError::new(RemoteErrorKind::Unknown, "commit", &diff.path, err.to_string())
            })?;
        }
        let paths: Vec<&str> = diffs.iter().map(|d| d.path.as_str()).collect();
        self.git.commit_paths(branch, &paths, message)?;
        Ok(())
    }

    fn push(&self, branch: &str) -> Result<(), RemoteError> {
        self.git.push(branch)
    }

    fn open_pr(&self, draft: &PullRequestDraft) -> Result<PullRequest, RemoteError> {
        let mut pr = self.api.create_pull(draft)?;
        if draft.labels.is_empty() {
            return Ok(pr);
        }
        if let Err(err) = self.api.add_labels(pr.number, draft.labels.as_slice()) {
            // An unlabeled PR is invisible to reset, so it must not stay open.
            warn!(number = pr.number, err = %err, "labeling failed, closing pull request");
            if let Err(close_err) = self.api.close_pull(pr.number) {
                warn!(
                    number = pr.number,
                    err = %close_err,
                    "failed to close unlabeled pull request"
                );
            }
            return Err(err);
        }
        pr.labels = draft.labels.as_slice().to_vec();
        Ok(pr)
    }

    fn list_prs(&self, labels: &LabelSet) -> Result<Vec<PullRequest>, RemoteError> {
        let pulls = self.api.list_open_pulls()?;
        Ok(pulls
            .into_iter()
            .filter(|pr| labels.is_subset_of(&pr.labels))
            .collect())
    }

    fn close_pr(&self, number: u64, delete_branch: bool) -> Result<(), RemoteError> {
        let closed = self.api.close_pull(number)?;
        if !delete_branch {
            return Ok(());
        }
        match self.delete_branch(&closed.head) {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn list_branches(&self, prefix: &str) -> Result<Vec<String>, RemoteError> {
        self.git.remote_branches(prefix)
    }
}
