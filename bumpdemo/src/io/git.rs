//! Git adapter for the demo working copy and its remote.
//!
//! Branch creation, commits, pushes and remote branch listing/deletion all go
//! through `git` subprocesses in one working directory. Failures are mapped
//! onto [`RemoteError`] so callers see one taxonomy for git and the REST API.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, instrument, warn};

use crate::error::{RemoteError, RemoteErrorKind};
use crate::io::config::Credential;
use crate::io::process::{CommandOutput, ProcessLimits, run_with_limits};

/// Wrapper for executing git commands against one working copy.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
    remote: String,
    credential: Option<Credential>,
    limits: ProcessLimits,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        Self {
            workdir: workdir.into(),
            remote: remote.into(),
            credential: None,
            limits: ProcessLimits::default(),
        }
    }

    /// Authenticate pushes and fetches through `gh auth git-credential`.
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn with_limits(mut self, limits: ProcessLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Fail with `Conflict` if the worktree has any change, tracked or not.
    pub fn ensure_clean(&self) -> Result<(), RemoteError> {
        let out = self.git("status", ".", &["status", "--porcelain=v1", "-uall"])?;
        let dirty: Vec<String> = out
            .stdout_str()
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect();
        if dirty.is_empty() {
            return Ok(());
        }
        warn!(dirty_count = dirty.len(), "worktree not clean");
        Err(RemoteError::new(
            RemoteErrorKind::Conflict,
            "sync_baseline",
            self.workdir.display().to_string(),
            format!("working tree not clean:\n{}", dirty.join("\n")),
        ))
    }

    /// Point the local `trunk` at the remote's tip and check it out.
    ///
    /// The remote is the source of truth: unpushed local trunk commits are
    /// discarded. Uncommitted changes are refused rather than lost.
    #[instrument(skip_all, fields(trunk))]
    pub fn sync_trunk(&self, trunk: &str) -> Result<(), RemoteError> {
        self.ensure_clean()?;
        self.git("sync_baseline", trunk, &["fetch", "--prune", &self.remote, trunk])?;
        let upstream = format!("{}/{trunk}", self.remote);
        self.git("sync_baseline", trunk, &["checkout", "-B", trunk, &upstream])?;
        debug!(trunk, "trunk synced with remote");
        Ok(())
    }

    pub fn local_branch_exists(&self, branch: &str) -> Result<bool, RemoteError> {
        let out = self.exec(
            "show_ref",
            branch,
            &["show-ref", "--verify", "--quiet", &format!("refs/heads/{branch}")],
        )?;
        Ok(out.success())
    }

    pub fn remote_branch_exists(&self, branch: &str) -> Result<bool, RemoteError> {
        let refname = format!("refs/heads/{branch}");
        let out = self.git(
            "list_branches",
            branch,
            &["ls-remote", "--heads", &self.remote, &refname],
        )?;
        Ok(parse_ls_remote(&out.stdout_str())
            .iter()
            .any(|name| name == branch))
    }

    /// Remote branch names under `prefix`, sorted.
    pub fn remote_branches(&self, prefix: &str) -> Result<Vec<String>, RemoteError> {
        let out = self.git("list_branches", prefix, &["ls-remote", "--heads", &self.remote])?;
        let mut names: Vec<String> = parse_ls_remote(&out.stdout_str())
            .into_iter()
            .filter(|name| name.starts_with(prefix))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Create `branch` at `start` without checking it out.
    #[instrument(skip_all, fields(branch))]
    pub fn create_branch(&self, branch: &str, start: &str) -> Result<(), RemoteError> {
        if self.local_branch_exists(branch)? || self.remote_branch_exists(branch)? {
            return Err(RemoteError::new(
                RemoteErrorKind::Conflict,
                "create_branch",
                branch,
                "branch already exists",
            ));
        }
        self.git("create_branch", branch, &["branch", branch, start])?;
        debug!(branch, start, "branch created");
        Ok(())
    }

    pub fn checkout(&self, branch: &str) -> Result<(), RemoteError> {
        self.git("checkout", branch, &["checkout", branch])?;
        Ok(())
    }

    /// Delete the local branch, switching to `fallback` first if it is checked out.
    pub fn delete_local_branch(&self, branch: &str, fallback: &str) -> Result<bool, RemoteError> {
        if !self.local_branch_exists(branch)? {
            return Ok(false);
        }
        if self.current_branch()? == branch {
            // Leftover edits on a discarded branch are not worth keeping.
            self.git("delete_branch", branch, &["checkout", "--force", fallback])?;
        }
        self.git("delete_branch", branch, &["branch", "-D", branch])?;
        Ok(true)
    }

    /// Delete `branch` on the remote. `NotFound` when it is already gone.
    #[instrument(skip_all, fields(branch))]
    pub fn delete_remote_branch(&self, branch: &str) -> Result<(), RemoteError> {
        self.git("delete_branch", branch, &["push", &self.remote, "--delete", branch])?;
        debug!(branch, "remote branch deleted");
        Ok(())
    }

    /// Stage `paths` and commit on the current branch.
    ///
    /// Returns `false` when nothing changed, in which case no commit is made.
    pub fn commit_paths(
        &self,
        branch: &str,
        paths: &[&str],
        message: &str,
    ) -> Result<bool, RemoteError> {
        let mut add = vec!["add", "--"];
        add.extend_from_slice(paths);
        self.git("commit", branch, &add)?;

        let staged = self.git("commit", branch, &["diff", "--cached", "--name-only"])?;
        if staged.stdout_str().trim().is_empty() {
            debug!(branch, "no staged changes, skipping commit");
            return Ok(false);
        }
        self.git("commit", branch, &["commit", "-m", message])?;
        Ok(true)
    }

    #[instrument(skip_all, fields(branch))]
    pub fn push(&self, branch: &str) -> Result<(), RemoteError> {
        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
        self.git("push", branch, &["push", &self.remote, &refspec])?;
        debug!(branch, "pushed");
        Ok(())
    }

    pub fn current_branch(&self) -> Result<String, RemoteError> {
        let out = self.git("current_branch", "HEAD", &["rev-parse", "--abbrev-ref", "HEAD"])?;
        Ok(out.stdout_str().trim().to_string())
    }

    fn git(
        &self,
        operation: &str,
        target: &str,
        args: &[&str],
    ) -> Result<CommandOutput, RemoteError> {
        let out = self.exec(operation, target, args)?;
        if out.timed_out {
            return Err(RemoteError::new(
                RemoteErrorKind::Unknown,
                operation,
                target,
                format!(
                    "git {} timed out after {}s",
                    args.join(" "),
                    self.limits.timeout.as_secs()
                ),
            ));
        }
        if !out.status.success() {
            let stderr = out.stderr_str();
            return Err(RemoteError::new(
                classify_git_failure(&stderr),
                operation,
                target,
                format!("git {} failed: {}", args.join(" "), stderr.trim()),
            ));
        }
        Ok(out)
    }

    fn exec(
        &self,
        operation: &str,
        target: &str,
        args: &[&str],
    ) -> Result<CommandOutput, RemoteError> {
        let mut cmd = Command::new("git");
        if let Some(credential) = &self.credential {
            cmd.args([
                "-c",
                "credential.helper=",
                "-c",
                "credential.helper=!gh auth git-credential",
            ])
            .env("GH_TOKEN", credential.expose());
        }
        cmd.args(args)
            .current_dir(&self.workdir)
            .env("GIT_TERMINAL_PROMPT", "0");
        run_with_limits(cmd, None, self.limits).map_err(|err| {
            RemoteError::new(RemoteErrorKind::Unknown, operation, target, format!("{err:#}"))
        })
    }
}

/// Map git's stderr onto the remote error taxonomy.
pub fn classify_git_failure(stderr: &str) -> RemoteErrorKind {
    let s = stderr.to_ascii_lowercase();
    if s.contains("rate limit") {
        RemoteErrorKind::RateLimited
    } else if s.contains("authentication failed")
        || s.contains("could not read username")
        || s.contains("permission denied")
        || s.contains("permission to")
        || s.contains("returned error: 403")
    {
        RemoteErrorKind::Auth
    } else if s.contains("remote ref does not exist")
        || s.contains("couldn't find remote ref")
        || s.contains("repository not found")
        || s.contains("did not match any")
    {
        RemoteErrorKind::NotFound
    } else if s.contains("already exists")
        || s.contains("[rejected]")
        || s.contains("non-fast-forward")
        || s.contains("fetch first")
        || s.contains("would be overwritten")
    {
        RemoteErrorKind::Conflict
    } else {
        RemoteErrorKind::Unknown
    }
}

/// Branch names from `git ls-remote --heads` output.
fn parse_ls_remote(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| line.split_once('\t'))
        .filter_map(|(_, refname)| refname.trim().strip_prefix("refs/heads/"))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_missing_remote_ref_as_not_found() {
        let stderr = "error: unable to delete 'x': remote ref does not exist\n";
        assert_eq!(classify_git_failure(stderr), RemoteErrorKind::NotFound);
    }

    #[test]
    fn classifies_rejected_push_as_conflict() {
        let stderr =
            " ! [rejected]        main -> main (fetch first)\nerror: failed to push some refs";
        assert_eq!(classify_git_failure(stderr), RemoteErrorKind::Conflict);
    }

    #[test]
    fn classifies_auth_failures() {
        assert_eq!(
            classify_git_failure("fatal: Authentication failed for 'https://github.com/a/b.git/'"),
            RemoteErrorKind::Auth
        );
        assert_eq!(
            classify_git_failure("remote: Permission to a/b.git denied to bot."),
            RemoteErrorKind::Auth
        );
    }

    #[test]
    fn unknown_failures_fall_through() {
        assert_eq!(classify_git_failure("fatal: early EOF"), RemoteErrorKind::Unknown);
    }

    #[test]
    fn parses_ls_remote_heads() {
        let stdout = concat!(
            "1111\trefs/heads/main\n",
            "2222\trefs/heads/dependabot/pip/pydantic-2.10.0-1760000000\n",
        );
        assert_eq!(
            parse_ls_remote(stdout),
            vec![
                "main".to_string(),
                "dependabot/pip/pydantic-2.10.0-1760000000".to_string()
            ]
        );
    }
}
