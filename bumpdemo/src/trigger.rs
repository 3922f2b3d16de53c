//! Orchestration for `bumpdemo trigger`.
//!
//! Hands the upgrade off to the remote workflow. Nothing is polled; once the
//! platform accepts the dispatch the command is done.

use std::collections::BTreeMap;

use tracing::{info, instrument};

use crate::error::{DemoError, Result};
use crate::io::config::DemoConfig;
use crate::io::dispatch::Dispatcher;

/// Inputs for the configured upgrade, overridable per invocation.
pub fn upgrade_inputs(
    cfg: &DemoConfig,
    package: Option<&str>,
    from: Option<&str>,
    to: Option<&str>,
) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("package".to_string(), package.unwrap_or(&cfg.package.name).to_string()),
        ("from".to_string(), from.unwrap_or(&cfg.package.baseline).to_string()),
        ("to".to_string(), to.unwrap_or(&cfg.package.upgrade).to_string()),
    ])
}

/// Dispatch the configured workflow against `git_ref`.
#[instrument(skip_all, fields(workflow = %cfg.workflow, git_ref))]
pub fn trigger<D: Dispatcher>(
    dispatcher: &D,
    cfg: &DemoConfig,
    git_ref: &str,
    inputs: &BTreeMap<String, String>,
) -> Result<()> {
    if git_ref.trim().is_empty() {
        return Err(DemoError::Configuration("ref must not be empty".to_string()));
    }
    dispatcher
        .dispatch(&cfg.workflow, git_ref, inputs)
        .map_err(DemoError::Dispatch)?;
    info!(workflow = %cfg.workflow, git_ref, "workflow dispatched");
    Ok(())
}
