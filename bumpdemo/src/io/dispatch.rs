//! Trigger adapter: fire a CI workflow against a ref.

use std::collections::BTreeMap;

use crate::error::RemoteError;
use crate::io::github::GhApi;

/// Something that can start a remote job. Fire-and-forget: implementations
/// return once the platform accepted the request.
pub trait Dispatcher {
    fn dispatch(
        &self,
        workflow: &str,
        git_ref: &str,
        inputs: &BTreeMap<String, String>,
    ) -> Result<(), RemoteError>;
}

/// Dispatches GitHub Actions `workflow_dispatch` events.
#[derive(Debug, Clone)]
pub struct GitHubDispatcher {
    api: GhApi,
}

impl GitHubDispatcher {
    pub fn new(api: GhApi) -> Self {
        Self { api }
    }
}

impl Dispatcher for GitHubDispatcher {
    fn dispatch(
        &self,
        workflow: &str,
        git_ref: &str,
        inputs: &BTreeMap<String, String>,
    ) -> Result<(), RemoteError> {
        self.api.dispatch_workflow(workflow, git_ref, inputs)
    }
}
