//! Stable exit codes for bumpdemo CLI commands.

use crate::error::DemoError;

/// Command succeeded.
pub const OK: i32 = 0;
/// A remote call, manifest edit or render failed.
pub const FAILED: i32 = 1;
/// Config file, repository slug or token is missing or invalid.
pub const CONFIG: i32 = 2;
/// The trunk manifest does not pin the expected baseline version.
pub const PRECONDITION: i32 = 3;
/// `bumpdemo reset` finished but at least one item failed.
pub const RESET_INCOMPLETE: i32 = 4;

/// Exit code for a failed command.
pub fn for_error(err: &DemoError) -> i32 {
    match err.root() {
        DemoError::Configuration(_) => CONFIG,
        DemoError::PreconditionMismatch { .. } => PRECONDITION,
        _ => FAILED,
    }
}
