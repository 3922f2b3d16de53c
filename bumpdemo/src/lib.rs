//! Demo orchestrator for automated dependency-upgrade pull requests.
//!
//! Drives a demo repository through a repeatable cycle: pin a package at a
//! baseline version, produce an upgrade branch with a labeled pull request,
//! then reset everything back to baseline. The architecture enforces a strict
//! separation:
//!
//! - **[`core`]**: Pure logic (manifest pins, branch naming, run lifecycle,
//!   changelog rendering). No I/O.
//! - **[`io`]**: Side-effecting adapters (git, `gh api`, config, processes),
//!   behind the [`io::vcs::VcsClient`] and [`io::dispatch::Dispatcher`] seams.
//!
//! Orchestration modules ([`simulate`], [`trigger`], [`reset`], [`status`])
//! coordinate core logic with I/O to implement CLI commands.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod reset;
pub mod simulate;
pub mod status;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod trigger;
