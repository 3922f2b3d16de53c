//! Orchestration for `bumpdemo reset`.
//!
//! Drives the repository back to its baseline no matter how many partial runs
//! came before:
//!
//! 1. close every open PR carrying the demo label set, deleting its branch;
//! 2. delete demo branches that have no PR (orphans of crashed runs);
//! 3. restore the trunk manifest pin if it drifted from the baseline.
//!
//! Every item is attempted independently. Failures are recorded in the
//! [`ResetReport`] and never stop the remaining work. `NotFound` counts as
//! success since someone else already removed the target.

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::changelog::{UpgradeNote, revert_commit_message};
use crate::core::manifest::{bump, pinned_version};
use crate::core::naming::{is_demo_branch, parse_branch};
use crate::core::types::{DemoRun, FileDiff, RunStatus};
use crate::error::{DemoError, RemoteError};
use crate::io::config::DemoConfig;
use crate::io::vcs::VcsClient;

/// What a report entry was about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetAction {
    ListPullRequests,
    ClosePullRequest,
    ListBranches,
    DeleteBranch,
    RevertManifest,
}

/// Result of one cleanup item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    Done,
    /// Target vanished between query and action.
    AlreadyGone,
    Failed { error: String },
}

impl ItemOutcome {
    fn from_remote(result: Result<(), RemoteError>) -> Self {
        match result {
            Ok(()) => ItemOutcome::Done,
            Err(err) if err.is_not_found() => ItemOutcome::AlreadyGone,
            Err(err) => ItemOutcome::Failed {
                error: err.to_string(),
            },
        }
    }

    fn failed(err: impl ToString) -> Self {
        ItemOutcome::Failed {
            error: err.to_string(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ItemOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResetItem {
    pub action: ResetAction,
    pub target: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

/// Everything `reset` found and what happened to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResetReport {
    pub items: Vec<ResetItem>,
    /// Demo runs whose pull requests were closed.
    pub reconciled: Vec<DemoRun>,
}

impl ResetReport {
    /// True when there was nothing to clean up.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_failures(&self) -> bool {
        self.items.iter().any(|item| item.outcome.is_failed())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ResetItem> {
        self.items.iter().filter(|item| item.outcome.is_failed())
    }

    pub fn items_for(&self, action: ResetAction) -> impl Iterator<Item = &ResetItem> {
        self.items.iter().filter(move |item| item.action == action)
    }

    fn record(&mut self, action: ResetAction, target: impl Into<String>, outcome: ItemOutcome) {
        let target = target.into();
        match &outcome {
            ItemOutcome::Failed { error } => {
                warn!(?action, target = %target, error = %error, "reset item failed");
            }
            _ => debug!(?action, target = %target, ?outcome, "reset item"),
        }
        self.items.push(ResetItem {
            action,
            target,
            outcome,
        });
    }
}

/// Reconcile demo PRs, branches and the trunk manifest back to baseline.
#[instrument(skip_all, fields(prefix = %cfg.branch_prefix))]
pub fn reset<V: VcsClient>(vcs: &V, cfg: &DemoConfig) -> ResetReport {
    let mut report = ResetReport::default();
    close_demo_prs(vcs, cfg, &mut report);
    delete_orphan_branches(vcs, cfg, &mut report);
    revert_manifest_drift(vcs, cfg, &mut report);
    info!(
        items = report.items.len(),
        failures = report.failures().count(),
        "reset finished"
    );
    report
}

fn close_demo_prs<V: VcsClient>(vcs: &V, cfg: &DemoConfig, report: &mut ResetReport) {
    let labels = cfg.label_set();
    let prs = match vcs.list_prs(&labels) {
        Ok(prs) => prs,
        Err(err) => {
            report.record(
                ResetAction::ListPullRequests,
                labels.as_slice().join(","),
                ItemOutcome::failed(err),
            );
            return;
        }
    };

    for pr in prs {
        let outcome = ItemOutcome::from_remote(vcs.close_pr(pr.number, true));
        if !outcome.is_failed()
            && let Some(branch) = parse_branch(&cfg.branch_prefix, &pr.head)
        {
            let mut run = DemoRun::new(
                pr.head.clone(),
                &branch.package,
                &cfg.package.baseline,
                &branch.version,
            );
            run.status = RunStatus::PrOpened;
            run.pr_number = Some(pr.number);
            run.pr_url = pr.url.clone();
            run.advance(RunStatus::Reconciled);
            report.reconciled.push(run);
        }
        report.record(
            ResetAction::ClosePullRequest,
            format!("#{} {}", pr.number, pr.head),
            outcome,
        );
    }
}

fn delete_orphan_branches<V: VcsClient>(vcs: &V, cfg: &DemoConfig, report: &mut ResetReport) {
    let branches = match vcs.list_branches(&cfg.branch_prefix) {
        Ok(branches) => branches,
        Err(err) => {
            report.record(
                ResetAction::ListBranches,
                cfg.branch_prefix.clone(),
                ItemOutcome::failed(err),
            );
            return;
        }
    };

    for branch in branches {
        if !is_demo_branch(&cfg.branch_prefix, &branch) {
            debug!(branch = %branch, "not a demo branch, leaving it alone");
            continue;
        }
        let outcome = ItemOutcome::from_remote(vcs.delete_branch(&branch));
        report.record(ResetAction::DeleteBranch, branch, outcome);
    }
}

fn revert_manifest_drift<V: VcsClient>(vcs: &V, cfg: &DemoConfig, report: &mut ResetReport) {
    let target = format!("{}:{}", cfg.manifest_path, cfg.package.name);
    match revert_manifest(vcs, cfg) {
        Ok(Some(from)) => {
            info!(from = %from, to = %cfg.package.baseline, "manifest reverted on trunk");
            report.record(ResetAction::RevertManifest, target, ItemOutcome::Done);
        }
        Ok(None) => debug!("manifest at baseline"),
        Err(err) => report.record(ResetAction::RevertManifest, target, ItemOutcome::failed(err)),
    }
}

/// Restore the baseline pin on trunk. Returns the drifted version, if any.
fn revert_manifest<V: VcsClient>(vcs: &V, cfg: &DemoConfig) -> Result<Option<String>, DemoError> {
    let package = &cfg.package.name;
    let baseline = &cfg.package.baseline;

    vcs.sync_baseline(&cfg.trunk)?;
    let content = vcs.read_file(&cfg.manifest_path)?;
    let current = pinned_version(&content, package)?;
    if &current == baseline {
        return Ok(None);
    }

    let patched = bump(&content, package, &current, baseline)?;
    let note = UpgradeNote {
        package,
        from: &current,
        to: baseline,
        manifest: &cfg.manifest_path,
        branch: &cfg.trunk,
    };
    let message = revert_commit_message(&note).map_err(|source| DemoError::Render {
        what: "revert commit message",
        source,
    })?;
    let diff = FileDiff {
        path: cfg.manifest_path.clone(),
        contents: patched,
    };
    vcs.commit(&cfg.trunk, &message, &[diff])?;
    vcs.push(&cfg.trunk)?;
    Ok(Some(current))
}
