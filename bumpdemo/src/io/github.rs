//! GitHub REST adapter built on `gh api`.
//!
//! `gh` handles transport, TLS and pagination; this module owns request
//! shaping, response decoding and mapping HTTP failures onto
//! [`RemoteErrorKind`]. The token is passed to `gh` through `GH_TOKEN`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Command;
use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::types::{PullRequest, PullRequestDraft};
use crate::error::{RemoteError, RemoteErrorKind};
use crate::io::config::{Credential, RepoSlug};
use crate::io::process::{ProcessLimits, run_with_limits};

static HTTP_STATUS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(HTTP (\d{3})\)").expect("HTTP status pattern is a valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
        }
    }
}

/// Client for one repository's REST endpoints.
#[derive(Debug, Clone)]
pub struct GhApi {
    slug: RepoSlug,
    credential: Credential,
    limits: ProcessLimits,
    program: PathBuf,
}

#[derive(Debug, Deserialize)]
struct ApiPull {
    number: u64,
    title: String,
    #[serde(default)]
    html_url: Option<String>,
    head: ApiRef,
    #[serde(default)]
    labels: Vec<ApiLabel>,
}

#[derive(Debug, Deserialize)]
struct ApiRef {
    #[serde(rename = "ref")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiLabel {
    name: String,
}

impl From<ApiPull> for PullRequest {
    fn from(pull: ApiPull) -> Self {
        PullRequest {
            number: pull.number,
            head: pull.head.name,
            title: pull.title,
            labels: pull.labels.into_iter().map(|l| l.name).collect(),
            url: pull.html_url,
        }
    }
}

#[derive(Debug, Serialize)]
struct CreatePull<'a> {
    title: &'a str,
    head: &'a str,
    base: &'a str,
    body: &'a str,
}

#[derive(Debug, Serialize)]
struct DispatchBody<'a> {
    #[serde(rename = "ref")]
    git_ref: &'a str,
    inputs: &'a BTreeMap<String, String>,
}

impl GhApi {
    pub fn new(slug: RepoSlug, credential: Credential, limits: ProcessLimits) -> Self {
        Self {
            slug,
            credential,
            limits,
            program: PathBuf::from("gh"),
        }
    }

    /// Run a different `gh` executable than the one on `PATH`.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn slug(&self) -> &RepoSlug {
        &self.slug
    }

    /// All open pull requests, across pages.
    #[instrument(skip_all)]
    pub fn list_open_pulls(&self) -> Result<Vec<PullRequest>, RemoteError> {
        let path = format!("repos/{}/pulls?state=open&per_page=100", self.slug);
        let pulls: Vec<ApiPull> = self.paginate("list_prs", &self.slug.to_string(), &path)?;
        debug!(count = pulls.len(), "listed open pull requests");
        Ok(pulls.into_iter().map(PullRequest::from).collect())
    }

    #[instrument(skip_all, fields(head = %draft.head))]
    pub fn create_pull(&self, draft: &PullRequestDraft) -> Result<PullRequest, RemoteError> {
        let body = CreatePull {
            title: &draft.title,
            head: &draft.head,
            base: &draft.base,
            body: &draft.body,
        };
        let path = format!("repos/{}/pulls", self.slug);
        let pull: ApiPull = self.call("open_pr", &draft.head, Method::Post, &path, Some(&body))?;
        Ok(pull.into())
    }

    pub fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), RemoteError> {
        let path = format!("repos/{}/issues/{number}/labels", self.slug);
        let body = serde_json::json!({ "labels": labels });
        let target = format!("#{number}");
        let _: Value = self.call("add_labels", &target, Method::Post, &path, Some(&body))?;
        Ok(())
    }

    /// Close a pull request, returning it as it was at close time.
    pub fn close_pull(&self, number: u64) -> Result<PullRequest, RemoteError> {
        let path = format!("repos/{}/pulls/{number}", self.slug);
        let body = serde_json::json!({ "state": "closed" });
        let target = format!("#{number}");
        let pull: ApiPull = self.call("close_pr", &target, Method::Patch, &path, Some(&body))?;
        Ok(pull.into())
    }

    #[instrument(skip_all, fields(workflow, git_ref))]
    pub fn dispatch_workflow(
        &self,
        workflow: &str,
        git_ref: &str,
        inputs: &BTreeMap<String, String>,
    ) -> Result<(), RemoteError> {
        let path = format!("repos/{}/actions/workflows/{workflow}/dispatches", self.slug);
        let body = DispatchBody { git_ref, inputs };
        let _: Value = self.call("dispatch", workflow, Method::Post, &path, Some(&body))?;
        Ok(())
    }

    fn call<B: Serialize, T: DeserializeOwned>(
        &self,
        operation: &str,
        target: &str,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, RemoteError> {
        let stdout = self.run(operation, target, method, path, body, false)?;
        let value = if stdout.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&stdout).map_err(|err| decode_error(operation, target, &err))?
        };
        serde_json::from_value(value).map_err(|err| decode_error(operation, target, &err))
    }

    fn paginate<T: DeserializeOwned>(
        &self,
        operation: &str,
        target: &str,
        path: &str,
    ) -> Result<Vec<T>, RemoteError> {
        let stdout = self.run::<Value>(operation, target, Method::Get, path, None, true)?;
        let mut items = Vec::new();
        for page in serde_json::Deserializer::from_str(&stdout).into_iter::<Vec<T>>() {
            items.extend(page.map_err(|err| decode_error(operation, target, &err))?);
        }
        Ok(items)
    }

    fn run<B: Serialize>(
        &self,
        operation: &str,
        target: &str,
        method: Method,
        path: &str,
        body: Option<&B>,
        paginate: bool,
    ) -> Result<String, RemoteError> {
        let input = body
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|err| {
                RemoteError::new(RemoteErrorKind::Unknown, operation, target, err.to_string())
            })?;

        let mut cmd = Command::new(&self.program);
        cmd.args(["api", "--method", method.as_str()])
            .args(["-H", "Accept: application/vnd.github+json"])
            .args(["-H", "X-GitHub-Api-Version: 2022-11-28"]);
        if paginate {
            cmd.arg("--paginate");
        }
        if input.is_some() {
            cmd.args(["--input", "-"]);
        }
        cmd.arg(path)
            .env("GH_TOKEN", self.credential.expose())
            .env("GH_PROMPT_DISABLED", "1")
            .env("NO_COLOR", "1");

        debug!(method = method.as_str(), path, "gh api");
        let out = run_with_limits(cmd, input.as_deref(), self.limits).map_err(|err| {
            RemoteError::new(RemoteErrorKind::Unknown, operation, target, format!("{err:#}"))
        })?;
        if out.timed_out {
            return Err(RemoteError::new(
                RemoteErrorKind::Unknown,
                operation,
                target,
                format!("gh api {path} timed out after {}s", self.limits.timeout.as_secs()),
            ));
        }
        let stdout = out.stdout_str();
        if !out.status.success() {
            let stderr = out.stderr_str();
            return Err(RemoteError::new(
                classify_api_failure(&stderr, &stdout),
                operation,
                target,
                failure_message(&stderr, &stdout),
            ));
        }
        Ok(stdout)
    }
}

fn decode_error(operation: &str, target: &str, err: &serde_json::Error) -> RemoteError {
    RemoteError::new(
        RemoteErrorKind::Unknown,
        operation,
        target,
        format!("decode response: {err}"),
    )
}

/// Map a failed `gh api` call onto the remote error taxonomy.
///
/// `gh` reports the HTTP status on stderr as `(HTTP 404)` and prints the
/// response body on stdout.
pub fn classify_api_failure(stderr: &str, stdout: &str) -> RemoteErrorKind {
    let text = format!("{stderr}\n{stdout}").to_ascii_lowercase();
    let status = HTTP_STATUS_RE
        .captures(stderr)
        .and_then(|caps| caps[1].parse::<u16>().ok());
    match status {
        Some(401) => RemoteErrorKind::Auth,
        Some(403) if text.contains("rate limit") => RemoteErrorKind::RateLimited,
        Some(403) => RemoteErrorKind::Auth,
        Some(429) => RemoteErrorKind::RateLimited,
        Some(404) => RemoteErrorKind::NotFound,
        Some(409) => RemoteErrorKind::Conflict,
        Some(422) if text.contains("reference does not exist") => RemoteErrorKind::NotFound,
        Some(422) if text.contains("already exists") => RemoteErrorKind::Conflict,
        Some(_) => RemoteErrorKind::Unknown,
        None if text.contains("gh auth login") || text.contains("bad credentials") => {
            RemoteErrorKind::Auth
        }
        None => RemoteErrorKind::Unknown,
    }
}

/// Prefer the API's own `message`, falling back to gh's stderr.
fn failure_message(stderr: &str, stdout: &str) -> String {
    let api_message = serde_json::from_str::<Value>(stdout.trim())
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string));
    match api_message {
        Some(msg) => msg,
        None => stderr.trim().trim_start_matches("gh: ").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_http_statuses() {
        let kind = |stderr: &str| classify_api_failure(stderr, "");
        assert_eq!(kind("gh: Not Found (HTTP 404)"), RemoteErrorKind::NotFound);
        assert_eq!(kind("gh: Bad credentials (HTTP 401)"), RemoteErrorKind::Auth);
        assert_eq!(
            kind("gh: Resource not accessible by integration (HTTP 403)"),
            RemoteErrorKind::Auth
        );
        assert_eq!(kind("gh: Conflict (HTTP 409)"), RemoteErrorKind::Conflict);
        assert_eq!(kind("gh: Server Error (HTTP 502)"), RemoteErrorKind::Unknown);
    }

    #[test]
    fn rate_limits_are_distinguished_from_auth() {
        let stdout = r#"{"message":"API rate limit exceeded for installation ID 1."}"#;
        assert_eq!(
            classify_api_failure("gh: API rate limit exceeded (HTTP 403)", stdout),
            RemoteErrorKind::RateLimited
        );
        assert_eq!(classify_api_failure("gh: (HTTP 429)", ""), RemoteErrorKind::RateLimited);
    }

    #[test]
    fn unprocessable_entity_is_refined_by_message() {
        let exists = concat!(
            r#"{"message":"Validation Failed","#,
            r#""errors":[{"message":"A pull request already exists for acme:b."}]}"#,
        );
        assert_eq!(
            classify_api_failure("gh: Validation Failed (HTTP 422)", exists),
            RemoteErrorKind::Conflict
        );
        let missing = r#"{"message":"Reference does not exist"}"#;
        assert_eq!(
            classify_api_failure("gh: Reference does not exist (HTTP 422)", missing),
            RemoteErrorKind::NotFound
        );
    }

    #[test]
    fn missing_login_is_auth() {
        assert_eq!(
            classify_api_failure("To get started with GitHub CLI, please run:  gh auth login", ""),
            RemoteErrorKind::Auth
        );
    }

    #[test]
    fn failure_message_prefers_api_body() {
        let stdout = r#"{"message":"Not Found","documentation_url":"https://docs.github.com"}"#;
        assert_eq!(failure_message("gh: Not Found (HTTP 404)", stdout), "Not Found");
        assert_eq!(failure_message("gh: boom\n", ""), "boom");
    }

    #[test]
    fn decodes_pull_payload() {
        let payload = concat!(
            r#"{"number":7,"title":"chore(deps): bump pydantic","#,
            r#""html_url":"https://github.com/acme/demo/pull/7","#,
            r#""head":{"ref":"dependabot/pip/pydantic-2.10.0-1760000000"},"#,
            r#""labels":[{"name":"dependencies"},{"name":"automated"}]}"#,
        );
        let pull: ApiPull = serde_json::from_str(payload).expect("decode");
        let pr = PullRequest::from(pull);
        assert_eq!(pr.number, 7);
        assert_eq!(pr.head, "dependabot/pip/pydantic-2.10.0-1760000000");
        assert_eq!(pr.labels, vec!["dependencies", "automated"]);
    }
}
