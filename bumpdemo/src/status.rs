//! Read-only view of demo state for `bumpdemo status`.

use serde::Serialize;
use tracing::instrument;

use crate::core::manifest::pinned_version;
use crate::core::naming::parse_branch;
use crate::core::types::{DemoRun, PullRequest, RunStatus};
use crate::error::Result;
use crate::io::config::DemoConfig;
use crate::io::vcs::VcsClient;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestStatus {
    pub path: String,
    pub package: String,
    pub baseline: String,
    pub current: String,
}

impl ManifestStatus {
    pub fn drifted(&self) -> bool {
        self.current != self.baseline
    }
}

/// What `reset` would act on right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub pull_requests: Vec<PullRequest>,
    /// Demo branches without an open demo PR.
    pub orphaned_branches: Vec<String>,
    /// Runs reconstructed from demo PRs and orphaned branches.
    pub runs: Vec<DemoRun>,
    pub manifest: ManifestStatus,
}

impl StatusReport {
    pub fn is_clean(&self) -> bool {
        self.pull_requests.is_empty()
            && self.orphaned_branches.is_empty()
            && !self.manifest.drifted()
    }
}

#[instrument(skip_all)]
pub fn inspect<V: VcsClient>(vcs: &V, cfg: &DemoConfig) -> Result<StatusReport> {
    let pull_requests = vcs.list_prs(&cfg.label_set())?;
    let orphaned_branches: Vec<String> = vcs
        .list_branches(&cfg.branch_prefix)?
        .into_iter()
        .filter(|b| parse_branch(&cfg.branch_prefix, b).is_some())
        .filter(|b| !pull_requests.iter().any(|pr| &pr.head == b))
        .collect();

    let mut runs = Vec::new();
    for pr in &pull_requests {
        if let Some(mut run) = reconstruct(cfg, &pr.head, RunStatus::PrOpened) {
            run.pr_number = Some(pr.number);
            run.pr_url = pr.url.clone();
            runs.push(run);
        }
    }
    runs.extend(
        orphaned_branches
            .iter()
            .filter_map(|b| reconstruct(cfg, b, RunStatus::Pushed)),
    );

    vcs.sync_baseline(&cfg.trunk)?;
    let content = vcs.read_file(&cfg.manifest_path)?;
    let manifest = ManifestStatus {
        path: cfg.manifest_path.clone(),
        package: cfg.package.name.clone(),
        baseline: cfg.package.baseline.clone(),
        current: pinned_version(&content, &cfg.package.name)?,
    };

    Ok(StatusReport {
        pull_requests,
        orphaned_branches,
        runs,
        manifest,
    })
}

fn reconstruct(cfg: &DemoConfig, branch: &str, status: RunStatus) -> Option<DemoRun> {
    let parsed = parse_branch(&cfg.branch_prefix, branch)?;
    let mut run = DemoRun::new(
        branch.to_string(),
        &parsed.package,
        &cfg.package.baseline,
        &parsed.version,
    );
    run.status = status;
    Some(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{InMemoryVcs, PYPROJECT, demo_config};

    #[test]
    fn reports_prs_orphans_and_drift() {
        let vcs = InMemoryVcs::with_manifest(&PYPROJECT.replace("1.10.7", "2.10.0"));
        vcs.seed_pr("dependabot/pip/pydantic-2.10.0-1760000000", &["dependencies", "automated"]);
        vcs.seed_remote_branch("dependabot/pip/pydantic-2.10.0-1760000100");
        vcs.seed_remote_branch("dependabot/pip/requests-2.32.0");

        let status = inspect(&vcs, &demo_config()).expect("inspect");
        assert_eq!(status.pull_requests.len(), 1);
        assert_eq!(
            status.orphaned_branches,
            vec!["dependabot/pip/pydantic-2.10.0-1760000100".to_string()]
        );
        assert_eq!(status.runs.len(), 2);
        assert_eq!(status.runs[0].status, RunStatus::PrOpened);
        assert_eq!(status.runs[1].status, RunStatus::Pushed);
        assert!(status.manifest.drifted());
        assert!(!status.is_clean());
    }

    #[test]
    fn clean_repository_is_clean() {
        let vcs = InMemoryVcs::with_manifest(PYPROJECT);
        let status = inspect(&vcs, &demo_config()).expect("inspect");
        assert!(status.is_clean());
        assert!(status.runs.is_empty());
    }
}
