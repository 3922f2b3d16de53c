use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::core::manifest::ManifestError;
use crate::core::types::DemoRun;

/// Classification of a failed platform call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    Auth,
    NotFound,
    RateLimited,
    Conflict,
    Unknown,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RemoteErrorKind::Auth => "auth",
            RemoteErrorKind::NotFound => "not found",
            RemoteErrorKind::RateLimited => "rate limited",
            RemoteErrorKind::Conflict => "conflict",
            RemoteErrorKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A failed call against the VCS platform, git remote, or dispatch endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} '{target}' failed ({kind}): {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    /// Operation name, e.g. `create_branch`.
    pub operation: String,
    /// Branch name, PR number, workflow id, or path the operation acted on.
    pub target: String,
    /// Platform or tool message, trimmed.
    pub message: String,
}

impl RemoteError {
    pub fn new(
        kind: RemoteErrorKind,
        operation: impl Into<String>,
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            operation: operation.into(),
            target: target.into(),
            message: message.into().trim().to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == RemoteErrorKind::NotFound
    }

    pub fn is_conflict(&self) -> bool {
        self.kind == RemoteErrorKind::Conflict
    }
}

#[derive(Debug, Error)]
pub enum DemoError {
    #[error("precondition mismatch: {package} is pinned at {found}, expected {expected}")]
    PreconditionMismatch {
        package: String,
        expected: String,
        found: String,
    },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("dispatch rejected: {0}")]
    Dispatch(#[source] RemoteError),

    #[error("{operation} gave up after {attempts} attempts: {last}")]
    ExhaustedRetries {
        operation: String,
        attempts: u32,
        last: RemoteError,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("render {what}: {source}")]
    Render {
        what: &'static str,
        #[source]
        source: minijinja::Error,
    },

    /// A simulate run that stopped part way; `run.status` is `Failed`.
    #[error("demo run on '{}' failed during {stage}: {source}", .run.branch_name)]
    RunFailed {
        run: Box<DemoRun>,
        stage: &'static str,
        #[source]
        source: Box<DemoError>,
    },
}

impl DemoError {
    /// The innermost error, looking through `RunFailed` wrappers.
    pub fn root(&self) -> &DemoError {
        match self {
            DemoError::RunFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, DemoError>;
