//! Commit messages and pull request text for demo upgrades.
//!
//! Rendering is deterministic: the same inputs always produce byte-identical
//! output, so repeated demo runs are diffable.

use minijinja::{Environment, context};
use serde::Serialize;

const COMMIT_TEMPLATE: &str = include_str!("templates/commit_message.txt");
const PR_BODY_TEMPLATE: &str = include_str!("templates/pr_body.md");

/// Semver-style classification of a version change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
    Major,
    Minor,
    Patch,
    Other,
}

impl UpdateKind {
    pub fn classify(from: &str, to: &str) -> Self {
        let (Some(a), Some(b)) = (numeric_parts(from), numeric_parts(to)) else {
            return UpdateKind::Other;
        };
        let part = |v: &[u64], i: usize| v.get(i).copied().unwrap_or(0);
        if part(&a, 0) != part(&b, 0) {
            UpdateKind::Major
        } else if part(&a, 1) != part(&b, 1) {
            UpdateKind::Minor
        } else if a != b {
            UpdateKind::Patch
        } else {
            UpdateKind::Other
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UpdateKind::Major => "major",
            UpdateKind::Minor => "minor",
            UpdateKind::Patch => "patch",
            UpdateKind::Other => "other",
        }
    }
}

fn numeric_parts(version: &str) -> Option<Vec<u64>> {
    version.split('.').map(|p| p.parse().ok()).collect()
}

/// Inputs shared by every rendered artifact of one upgrade.
#[derive(Debug, Clone)]
pub struct UpgradeNote<'a> {
    pub package: &'a str,
    pub from: &'a str,
    pub to: &'a str,
    pub manifest: &'a str,
    pub branch: &'a str,
}

struct ChangelogEngine {
    env: Environment<'static>,
}

impl ChangelogEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("commit", COMMIT_TEMPLATE)
            .expect("commit template should be valid");
        env.add_template("pr_body", PR_BODY_TEMPLATE)
            .expect("pr body template should be valid");
        Self { env }
    }

    fn render(
        &self,
        name: &str,
        note: &UpgradeNote<'_>,
        verb: &str,
    ) -> Result<String, minijinja::Error> {
        let kind = UpdateKind::classify(note.from, note.to);
        self.env.get_template(name)?.render(context! {
            verb => verb,
            package => note.package,
            from => note.from,
            to => note.to,
            kind => kind.as_str(),
            manifest => note.manifest,
            branch => note.branch,
        })
    }
}

/// Pull request title (same as the commit subject).
pub fn pr_title(note: &UpgradeNote<'_>) -> String {
    format!(
        "chore(deps): bump {} from {} to {}",
        note.package, note.from, note.to
    )
}

/// Structured commit message embedding package and both versions.
pub fn bump_commit_message(note: &UpgradeNote<'_>) -> Result<String, minijinja::Error> {
    ChangelogEngine::new().render("commit", note, "bump")
}

/// Commit message used when `reset` restores the baseline pin.
pub fn revert_commit_message(note: &UpgradeNote<'_>) -> Result<String, minijinja::Error> {
    ChangelogEngine::new().render("commit", note, "revert")
}

/// Changelog-style pull request body.
pub fn pr_body(note: &UpgradeNote<'_>) -> Result<String, minijinja::Error> {
    ChangelogEngine::new().render("pr_body", note, "bump")
}
