//! Orchestrator configuration (`bumpdemo.toml`) and credential loading.

use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::manifest::validate_package;
use crate::core::types::LabelSet;
use crate::error::DemoError;
use crate::io::process::ProcessLimits;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "bumpdemo.toml";

/// Orchestrator configuration (TOML).
///
/// Every field has a default matching the stock demo repository, so the file
/// is optional. Missing fields fall back individually.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DemoConfig {
    /// `owner/name` of the demo repository. Falls back to `GITHUB_REPOSITORY`.
    pub repository: String,
    /// Git remote the working copy pushes to.
    pub remote: String,
    /// Trunk branch holding the baseline manifest.
    pub trunk: String,
    /// Manifest path relative to the repository root.
    pub manifest_path: String,
    /// Prefix under which demo branches are created.
    pub branch_prefix: String,
    /// Labels marking demo pull requests.
    pub labels: Vec<String>,
    /// Workflow file name or id dispatched by `trigger`.
    pub workflow: String,
    /// Environment variable holding the API token.
    pub token_env: String,
    /// Deadline for each git/gh call, in seconds.
    pub timeout_secs: u64,
    /// Bytes of child output kept per stream.
    pub output_limit_bytes: usize,
    pub package: PackageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PackageConfig {
    pub name: String,
    /// Version the trunk manifest is reset to.
    pub baseline: String,
    /// Version `simulate` bumps to by default.
    pub upgrade: String,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            name: "pydantic".to_string(),
            baseline: "1.10.7".to_string(),
            upgrade: "2.10.0".to_string(),
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            repository: String::new(),
            remote: "origin".to_string(),
            trunk: "main".to_string(),
            manifest_path: "pyproject.toml".to_string(),
            branch_prefix: "dependabot/pip".to_string(),
            labels: vec!["dependencies".to_string(), "automated".to_string()],
            workflow: "simulate-upgrade.yml".to_string(),
            token_env: "GITHUB_TOKEN".to_string(),
            timeout_secs: 60,
            output_limit_bytes: 1024 * 1024,
            package: PackageConfig::default(),
        }
    }
}

impl DemoConfig {
    pub fn validate(&self) -> Result<()> {
        if self.repository.is_empty() {
            return Err(anyhow!(
                "repository must be set (config `repository` or GITHUB_REPOSITORY)"
            ));
        }
        RepoSlug::parse(&self.repository)?;
        for (name, value) in [
            ("remote", &self.remote),
            ("trunk", &self.trunk),
            ("manifest_path", &self.manifest_path),
            ("branch_prefix", &self.branch_prefix),
            ("workflow", &self.workflow),
            ("token_env", &self.token_env),
        ] {
            if value.trim().is_empty() {
                return Err(anyhow!("{name} must not be empty"));
            }
        }
        if self.labels.iter().all(|l| l.trim().is_empty()) {
            return Err(anyhow!("labels must contain at least one label"));
        }
        if self.timeout_secs == 0 {
            return Err(anyhow!("timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        validate_package(&self.package.name)
            .map_err(|err| anyhow!("package.name: {err}"))?;
        if self.package.baseline.is_empty() || self.package.upgrade.is_empty() {
            return Err(anyhow!("package.baseline and package.upgrade must be set"));
        }
        Ok(())
    }

    pub fn label_set(&self) -> LabelSet {
        LabelSet::new(self.labels.iter().filter(|l| !l.trim().is_empty()).cloned())
    }

    pub fn limits(&self) -> ProcessLimits {
        ProcessLimits {
            timeout: Duration::from_secs(self.timeout_secs),
            output_limit_bytes: self.output_limit_bytes,
        }
    }

    pub fn slug(&self) -> Result<RepoSlug> {
        RepoSlug::parse(&self.repository)
    }
}

/// `owner/name` pair addressing a repository on the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

impl RepoSlug {
    pub fn parse(raw: &str) -> Result<Self> {
        let (owner, name) = raw
            .trim()
            .split_once('/')
            .ok_or_else(|| anyhow!("repository must be owner/name (got '{raw}')"))?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(anyhow!("repository must be owner/name (got '{raw}')"));
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// API token. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Load config from a TOML file, then apply environment fallbacks.
///
/// A missing file yields `DemoConfig::default()`. `env` is consulted for
/// `GITHUB_REPOSITORY` when the file leaves `repository` empty.
pub fn load_config(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<DemoConfig> {
    let mut cfg = if path.exists() {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?
    } else {
        DemoConfig::default()
    };
    if cfg.repository.is_empty()
        && let Some(repo) = env("GITHUB_REPOSITORY").filter(|r| !r.trim().is_empty())
    {
        cfg.repository = repo.trim().to_string();
    }
    cfg.validate()?;
    Ok(cfg)
}

/// Read the API token named by `cfg.token_env`.
///
/// Missing or blank is a configuration error, reported before any remote
/// call is attempted.
pub fn load_credential(
    cfg: &DemoConfig,
    env: impl Fn(&str) -> Option<String>,
) -> std::result::Result<Credential, DemoError> {
    match env(&cfg.token_env) {
        Some(token) if !token.trim().is_empty() => Ok(Credential::new(token.trim())),
        _ => Err(DemoError::Configuration(format!(
            "{} is not set; export a token with repo and workflow scope",
            cfg.token_env
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn missing_file_uses_defaults_plus_env_repository() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml"), |key| {
            (key == "GITHUB_REPOSITORY").then(|| "acme/demo".to_string())
        })
        .expect("load");
        assert_eq!(cfg.repository, "acme/demo");
        assert_eq!(cfg.package, PackageConfig::default());
        assert_eq!(cfg.trunk, "main");
    }

    #[test]
    fn missing_repository_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = load_config(&temp.path().join("missing.toml"), no_env).unwrap_err();
        assert!(err.to_string().contains("repository must be set"));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(DEFAULT_CONFIG_FILE);
        fs::write(
            &path,
            "repository = \"acme/demo\"\ntrunk = \"develop\"\n\n[package]\nname = \"fastapi\"\n",
        )
        .expect("write");
        let cfg = load_config(&path, no_env).expect("load");
        assert_eq!(cfg.trunk, "develop");
        assert_eq!(cfg.package.name, "fastapi");
        assert_eq!(cfg.package.baseline, "1.10.7");
        assert_eq!(cfg.branch_prefix, "dependabot/pip");
    }

    #[test]
    fn file_repository_wins_over_env() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, "repository = \"acme/demo\"\n").expect("write");
        let cfg = load_config(&path, |_| Some("other/repo".to_string())).expect("load");
        assert_eq!(cfg.repository, "acme/demo");
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let cfg = DemoConfig {
            repository: "acme/demo".to_string(),
            timeout_secs: 0,
            ..DemoConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn slug_requires_owner_and_name() {
        assert!(RepoSlug::parse("acme").is_err());
        assert!(RepoSlug::parse("acme/demo/extra").is_err());
        assert_eq!(RepoSlug::parse("acme/demo").expect("slug").to_string(), "acme/demo");
    }

    #[test]
    fn missing_token_is_configuration_error() {
        let cfg = DemoConfig::default();
        let err = load_credential(&cfg, |_| Some("   ".to_string())).unwrap_err();
        assert!(matches!(err, DemoError::Configuration(msg) if msg.contains("GITHUB_TOKEN")));
    }

    #[test]
    fn credential_debug_is_redacted() {
        let cfg = DemoConfig::default();
        let token = load_credential(&cfg, |_| Some("ghp_secret".to_string())).expect("token");
        assert_eq!(token.expose(), "ghp_secret");
        assert!(!format!("{token:?}").contains("ghp_secret"));
    }
}
