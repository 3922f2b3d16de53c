//! Reconciliation tests for `reset`.
//!
//! Each scenario seeds the in-memory platform with leftovers of earlier runs
//! and checks what the report says and what is left afterwards.

use bumpdemo::core::types::RunStatus;
use bumpdemo::error::RemoteErrorKind;
use bumpdemo::reset::{ItemOutcome, ResetAction, reset};
use bumpdemo::simulate::{SimulateRequest, simulate_with_clock};
use bumpdemo::test_support::{InMemoryVcs, PYPROJECT, VcsOp, demo_config};

const PR_BRANCH: &str = "dependabot/pip/pydantic-2.10.0-1760000000";
const ORPHAN: &str = "dependabot/pip/pydantic-2.10.0-1760000042";
const DEMO_LABELS: &[&str] = &["dependencies", "automated"];

#[test]
fn closes_pr_and_deletes_orphan() {
    let vcs = InMemoryVcs::with_manifest(PYPROJECT);
    let number = vcs.seed_pr(PR_BRANCH, DEMO_LABELS);
    vcs.seed_remote_branch(ORPHAN);

    let report = reset(&vcs, &demo_config());

    assert!(!report.has_failures());
    let closed: Vec<_> = report.items_for(ResetAction::ClosePullRequest).collect();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].target, format!("#{number} {PR_BRANCH}"));
    assert_eq!(closed[0].outcome, ItemOutcome::Done);
    let deleted: Vec<_> = report.items_for(ResetAction::DeleteBranch).collect();
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].target, ORPHAN);

    assert!(vcs.open_prs().is_empty());
    assert_eq!(vcs.remote_branches(), vec!["main".to_string()]);

    assert_eq!(report.reconciled.len(), 1);
    assert_eq!(report.reconciled[0].status, RunStatus::Reconciled);
    assert_eq!(report.reconciled[0].pr_number, Some(number));
}

#[test]
fn second_reset_finds_nothing() {
    let vcs = InMemoryVcs::with_manifest(&PYPROJECT.replace("1.10.7", "2.10.0"));
    vcs.seed_pr(PR_BRANCH, DEMO_LABELS);
    vcs.seed_remote_branch(ORPHAN);
    let cfg = demo_config();

    let first = reset(&vcs, &cfg);
    assert!(!first.is_empty());
    assert!(!first.has_failures());

    let second = reset(&vcs, &cfg);
    assert!(second.is_empty(), "second reset did work: {:?}", second.items);
}

#[test]
fn reset_after_simulate_restores_baseline() {
    let vcs = InMemoryVcs::with_manifest(PYPROJECT);
    let cfg = demo_config();
    let run = simulate_with_clock(&vcs, &cfg, &SimulateRequest::from_config(&cfg, false), || {
        1_760_000_000
    })
    .expect("simulate");

    let report = reset(&vcs, &cfg);

    assert!(!report.has_failures());
    assert_eq!(report.reconciled.len(), 1);
    assert_eq!(report.reconciled[0].branch_name, run.branch_name);
    assert!(vcs.open_prs().is_empty());
    assert!(!vcs.remote_branches().contains(&run.branch_name));
}

#[test]
fn vanished_branch_counts_as_already_gone() {
    let vcs = InMemoryVcs::with_manifest(PYPROJECT);
    vcs.seed_remote_branch(ORPHAN);
    vcs.fail_next_on(VcsOp::DeleteBranch, ORPHAN, RemoteErrorKind::NotFound);

    let report = reset(&vcs, &demo_config());

    assert!(!report.has_failures());
    let items: Vec<_> = report.items_for(ResetAction::DeleteBranch).collect();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].outcome, ItemOutcome::AlreadyGone);
}

#[test]
fn pr_closed_concurrently_counts_as_already_gone() {
    let vcs = InMemoryVcs::with_manifest(PYPROJECT);
    let number = vcs.seed_pr(PR_BRANCH, DEMO_LABELS);
    vcs.fail_next_on(VcsOp::ClosePr, &number.to_string(), RemoteErrorKind::NotFound);

    let report = reset(&vcs, &demo_config());

    assert!(!report.has_failures());
    let items: Vec<_> = report.items_for(ResetAction::ClosePullRequest).collect();
    assert_eq!(items[0].outcome, ItemOutcome::AlreadyGone);
    assert!(report.reconciled.iter().all(|run| run.branch_name == PR_BRANCH));
}

#[test]
fn one_failure_does_not_stop_the_rest() {
    let vcs = InMemoryVcs::with_manifest(PYPROJECT);
    let first = vcs.seed_pr(PR_BRANCH, DEMO_LABELS);
    vcs.seed_pr("dependabot/pip/pydantic-2.10.0-1760000100", DEMO_LABELS);
    vcs.seed_remote_branch(ORPHAN);
    vcs.fail_next_on(VcsOp::ClosePr, &first.to_string(), RemoteErrorKind::RateLimited);

    let report = reset(&vcs, &demo_config());

    assert!(report.has_failures());
    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].action, ResetAction::ClosePullRequest);
    assert!(matches!(
        &failures[0].outcome,
        ItemOutcome::Failed { error } if error.contains("rate limited")
    ));

    // The other PR was closed and the orphan deleted.
    assert_eq!(vcs.open_prs().len(), 1);
    assert_eq!(vcs.open_prs()[0].number, first);
    assert!(!vcs.remote_branches().contains(&ORPHAN.to_string()));
}

#[test]
fn drifted_manifest_is_reverted_on_trunk() {
    let vcs = InMemoryVcs::with_manifest(&PYPROJECT.replace("1.10.7", "2.10.0"));

    let report = reset(&vcs, &demo_config());

    let items: Vec<_> = report.items_for(ResetAction::RevertManifest).collect();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].outcome, ItemOutcome::Done);
    assert_eq!(
        vcs.remote_file("main", "pyproject.toml").as_deref(),
        Some(PYPROJECT)
    );
    let (branch, message) = &vcs.commit_messages()[0];
    assert_eq!(branch, "main");
    assert!(message.starts_with("chore(deps): revert pydantic from 2.10.0 to 1.10.7"));
}

#[test]
fn foreign_branches_and_prs_are_untouched() {
    let vcs = InMemoryVcs::with_manifest(PYPROJECT);
    vcs.seed_remote_branch("dependabot/pip/requests-2.32.0");
    vcs.seed_remote_branch("feature/login");
    vcs.seed_pr("feature/docs", &["documentation"]);
    vcs.seed_pr("dependabot/pip/urllib3-2.2.2", &["dependencies"]);

    let report = reset(&vcs, &demo_config());

    assert!(report.is_empty());
    assert_eq!(vcs.open_prs().len(), 2);
    assert!(vcs.remote_branches().contains(&"dependabot/pip/requests-2.32.0".to_string()));
    assert_eq!(vcs.calls_of(VcsOp::DeleteBranch), 0);
}

#[test]
fn pre_release_branch_left_by_failed_run_is_cleaned_up() {
    let vcs = InMemoryVcs::with_manifest(PYPROJECT);
    let cfg = demo_config();
    vcs.fail_next(VcsOp::OpenPr, RemoteErrorKind::Unknown);
    let request = SimulateRequest {
        package: "pydantic".to_string(),
        old_version: "1.10.7".to_string(),
        new_version: "2.0.0-beta1".to_string(),
        dry_run: false,
    };

    simulate_with_clock(&vcs, &cfg, &request, || 1_760_000_000).unwrap_err();
    assert!(
        vcs.remote_branches()
            .contains(&"dependabot/pip/pydantic-2.0.0-beta1-1760000000".to_string())
    );

    let report = reset(&vcs, &cfg);

    assert!(!report.has_failures());
    let deleted: Vec<_> = report.items_for(ResetAction::DeleteBranch).collect();
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].target, "dependabot/pip/pydantic-2.0.0-beta1-1760000000");
    assert_eq!(vcs.remote_branches(), vec!["main".to_string()]);
}
