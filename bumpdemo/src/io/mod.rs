//! Side-effecting adapters: configuration, subprocesses, git and the platform API.

pub mod config;
pub mod dispatch;
pub mod git;
pub mod github;
pub mod process;
pub mod vcs;
