//! Orchestration for `bumpdemo simulate`.
//!
//! Manufactures the same end state the remote upgrade workflow would: a demo
//! branch carrying a single pinned-version bump, pushed, with a labeled pull
//! request. The run walks `Created -> Pushed -> PrOpened`. Anything that fails
//! before the push deletes the branch again; failures at or after the push
//! leave the branch in place for inspection.

use tracing::{debug, info, instrument, warn};

use crate::core::changelog::{UpgradeNote, bump_commit_message, pr_body, pr_title};
use crate::core::manifest::{bump, pinned_version, validate_package};
use crate::core::naming::{branch_name, ensure_parseable};
use crate::core::types::{DemoRun, FileDiff, PullRequestDraft, RunStatus};
use crate::error::{DemoError, Result};
use crate::io::config::DemoConfig;
use crate::io::vcs::VcsClient;

/// Branch names tried before giving up on collisions.
pub const MAX_BRANCH_ATTEMPTS: u32 = 3;

/// Parameters for one simulated upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulateRequest {
    pub package: String,
    pub old_version: String,
    pub new_version: String,
    /// Stop after patching; nothing is committed or pushed.
    pub dry_run: bool,
}

impl SimulateRequest {
    /// Request built from the configured demo package.
    pub fn from_config(cfg: &DemoConfig, dry_run: bool) -> Self {
        Self {
            package: cfg.package.name.clone(),
            old_version: cfg.package.baseline.clone(),
            new_version: cfg.package.upgrade.clone(),
            dry_run,
        }
    }
}

/// Everything derived locally before the branch is committed to.
struct PreparedChange {
    diff: FileDiff,
    message: String,
    title: String,
    body: String,
}

/// Run a simulated upgrade using the wall clock for branch naming.
pub fn simulate<V: VcsClient>(
    vcs: &V,
    cfg: &DemoConfig,
    request: &SimulateRequest,
) -> Result<DemoRun> {
    simulate_with_clock(vcs, cfg, request, || chrono::Utc::now().timestamp())
}

/// Run a simulated upgrade, reading unix seconds from `now`.
#[instrument(
    skip_all,
    fields(
        package = %request.package,
        from = %request.old_version,
        to = %request.new_version,
        dry_run = request.dry_run,
    )
)]
pub fn simulate_with_clock<V, C>(
    vcs: &V,
    cfg: &DemoConfig,
    request: &SimulateRequest,
    now: C,
) -> Result<DemoRun>
where
    V: VcsClient,
    C: Fn() -> i64,
{
    validate_package(&request.package)?;
    ensure_parseable(&cfg.branch_prefix, &request.package, &request.new_version)?;

    vcs.sync_baseline(&cfg.trunk)?;
    let manifest = vcs.read_file(&cfg.manifest_path)?;
    let found = pinned_version(&manifest, &request.package)?;
    if found != request.old_version {
        return Err(DemoError::PreconditionMismatch {
            package: request.package.clone(),
            expected: request.old_version.clone(),
            found,
        });
    }

    let branch = allocate_branch(vcs, cfg, request, &now)?;
    let mut run = DemoRun::new(
        branch,
        &request.package,
        &request.old_version,
        &request.new_version,
    );
    info!(branch = %run.branch_name, "demo branch created");

    let change = match prepare_change(cfg, request, &run.branch_name, &manifest) {
        Ok(change) => change,
        Err(err) => return Err(discard(vcs, run, "patch", err)),
    };

    if request.dry_run {
        match vcs.delete_branch(&run.branch_name) {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(fail(run, "discard", err.into())),
        }
        info!(branch = %run.branch_name, "dry run: branch discarded");
        return Ok(run);
    }

    if let Err(err) = vcs.commit(&run.branch_name, &change.message, &[change.diff]) {
        return Err(discard(vcs, run, "commit", err.into()));
    }

    if let Err(err) = vcs.push(&run.branch_name) {
        return Err(fail(run, "push", err.into()));
    }
    run.advance(RunStatus::Pushed);
    debug!(branch = %run.branch_name, "pushed");

    let draft = PullRequestDraft {
        head: run.branch_name.clone(),
        base: cfg.trunk.clone(),
        title: change.title,
        body: change.body,
        labels: cfg.label_set(),
    };
    let pr = match vcs.open_pr(&draft) {
        Ok(pr) => pr,
        Err(err) => return Err(fail(run, "open_pr", err.into())),
    };
    run.pr_number = Some(pr.number);
    run.pr_url = pr.url;
    run.advance(RunStatus::PrOpened);
    info!(branch = %run.branch_name, number = pr.number, "pull request opened");
    Ok(run)
}

/// Create a fresh demo branch, retrying name collisions.
///
/// Each attempt re-reads the clock and appends the attempt number, so two runs
/// in the same second still get distinct names.
fn allocate_branch<V, C>(
    vcs: &V,
    cfg: &DemoConfig,
    request: &SimulateRequest,
    now: &C,
) -> Result<String>
where
    V: VcsClient,
    C: Fn() -> i64,
{
    let mut attempt = 1;
    loop {
        let name = branch_name(
            &cfg.branch_prefix,
            &request.package,
            &request.new_version,
            now(),
            attempt,
        );
        match vcs.create_branch(&name, &cfg.trunk) {
            Ok(()) => return Ok(name),
            Err(err) if err.is_conflict() => {
                debug!(branch = %name, attempt, "branch name taken");
                if attempt >= MAX_BRANCH_ATTEMPTS {
                    return Err(DemoError::ExhaustedRetries {
                        operation: "create_branch".to_string(),
                        attempts: attempt,
                        last: err,
                    });
                }
                attempt += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

fn prepare_change(
    cfg: &DemoConfig,
    request: &SimulateRequest,
    branch: &str,
    manifest: &str,
) -> Result<PreparedChange> {
    let patched = bump(
        manifest,
        &request.package,
        &request.old_version,
        &request.new_version,
    )?;
    let note = UpgradeNote {
        package: &request.package,
        from: &request.old_version,
        to: &request.new_version,
        manifest: &cfg.manifest_path,
        branch,
    };
    let message = bump_commit_message(&note).map_err(|source| DemoError::Render {
        what: "commit message",
        source,
    })?;
    let body = pr_body(&note).map_err(|source| DemoError::Render {
        what: "pull request body",
        source,
    })?;
    Ok(PreparedChange {
        diff: FileDiff {
            path: cfg.manifest_path.clone(),
            contents: patched,
        },
        message,
        title: pr_title(&note),
        body,
    })
}

/// Delete the run's unpublished branch, then report the failure.
fn discard<V: VcsClient>(
    vcs: &V,
    run: DemoRun,
    stage: &'static str,
    err: DemoError,
) -> DemoError {
    match vcs.delete_branch(&run.branch_name) {
        Ok(()) => debug!(branch = %run.branch_name, "orphaned branch deleted"),
        Err(del) if del.is_not_found() => {}
        Err(del) => {
            warn!(branch = %run.branch_name, err = %del, "failed to delete orphaned branch");
        }
    }
    fail(run, stage, err)
}

fn fail(mut run: DemoRun, stage: &'static str, err: DemoError) -> DemoError {
    run.advance(RunStatus::Failed);
    warn!(branch = %run.branch_name, stage, err = %err, "demo run failed");
    DemoError::RunFailed {
        run: Box::new(run),
        stage,
        source: Box::new(err),
    }
}
