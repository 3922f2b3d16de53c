//! Demo branch naming.
//!
//! Demo branches look like `<prefix>/<package>-<version>-<unix-ts>`, with a
//! `-<n>` suffix appended when an earlier candidate for the same second was
//! already taken. The timestamp part is what distinguishes demo branches from
//! genuine dependency-bot branches that share the prefix.
//!
//! Versions may themselves contain `-` (`2.0.0-beta1`), so the timestamp is
//! taken as the last run of nine or more digits before the optional suffix.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::core::manifest::ManifestError;

static DEMO_BRANCH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?P<package>[A-Za-z0-9._-]+?)",
        r"-(?P<version>[0-9][A-Za-z0-9._+!-]*?)",
        r"-(?P<ts>[0-9]{9,})(?:-(?P<attempt>[0-9]+))?$",
    ))
    .expect("demo branch pattern is a valid regex")
});

const SAMPLE_TIMESTAMP: i64 = 1_700_000_000;

/// Components recovered from a demo branch name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DemoBranch {
    pub package: String,
    pub version: String,
    pub timestamp: i64,
    pub attempt: u32,
}

/// Build the branch name for `attempt` (1-based) at `timestamp`.
pub fn branch_name(
    prefix: &str,
    package: &str,
    version: &str,
    timestamp: i64,
    attempt: u32,
) -> String {
    let prefix = prefix.trim_end_matches('/');
    if attempt <= 1 {
        format!("{prefix}/{package}-{version}-{timestamp}")
    } else {
        format!("{prefix}/{package}-{version}-{timestamp}-{attempt}")
    }
}

/// Parse `name` as a demo branch under `prefix`.
///
/// Returns `None` for anything that does not follow the demo convention,
/// including branches under the prefix without a timestamp.
pub fn parse_branch(prefix: &str, name: &str) -> Option<DemoBranch> {
    let prefix = prefix.trim_end_matches('/');
    let rest = name.strip_prefix(prefix)?.strip_prefix('/')?;
    let caps = DEMO_BRANCH_RE.captures(rest)?;
    let attempt = match caps.name("attempt") {
        Some(m) => m.as_str().parse().ok()?,
        None => 1,
    };
    Some(DemoBranch {
        package: caps["package"].to_string(),
        version: caps["version"].to_string(),
        timestamp: caps["ts"].parse().ok()?,
        attempt,
    })
}

/// True if `name` is a demo branch under `prefix`.
pub fn is_demo_branch(prefix: &str, name: &str) -> bool {
    parse_branch(prefix, name).is_some()
}

/// Refuse a package/version pair whose branch names would not parse back.
///
/// `reset` finds leftovers only through [`parse_branch`], so a branch it
/// cannot recognise must never be created.
pub fn ensure_parseable(prefix: &str, package: &str, version: &str) -> Result<(), ManifestError> {
    for attempt in [1, 2] {
        let name = branch_name(prefix, package, version, SAMPLE_TIMESTAMP, attempt);
        let round_trips = parse_branch(prefix, &name).is_some_and(|branch| {
            branch.package == package && branch.version == version && branch.attempt == attempt
        });
        if !round_trips {
            return Err(ManifestError::InvalidVersion(version.to_string()));
        }
    }
    Ok(())
}
