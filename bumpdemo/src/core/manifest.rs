//! Pinned-version patching for dependency manifests.
//!
//! A pin is a quoted `name==version` token, e.g. `"pydantic==1.10.7"` inside a
//! `pyproject.toml` dependency list. Only the version substring of that token is
//! ever rewritten; every other byte of the file is preserved.

use std::ops::Range;

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    #[error("pinned version for '{package}' not found: {reason}")]
    TokenNotFound { package: String, reason: String },

    #[error("invalid package name '{0}'")]
    InvalidPackage(String),

    #[error("invalid version '{0}'")]
    InvalidVersion(String),
}

/// Return the version `package` is currently pinned to.
pub fn pinned_version(content: &str, package: &str) -> Result<String, ManifestError> {
    let range = find_pin(content, package)?;
    Ok(content[range].to_string())
}

/// Rewrite the pin for `package` from `from` to `to`.
///
/// Already at `to` returns the content unchanged. Any other current value is
/// refused rather than guessed at.
pub fn bump(content: &str, package: &str, from: &str, to: &str) -> Result<String, ManifestError> {
    validate_version(from)?;
    validate_version(to)?;
    let range = find_pin(content, package)?;
    let current = &content[range.clone()];
    if current == to {
        return Ok(content.to_string());
    }
    if current != from {
        return Err(ManifestError::TokenNotFound {
            package: package.to_string(),
            reason: format!("pinned at {current}, expected {from} or {to}"),
        });
    }

    let mut out = String::with_capacity(content.len() + to.len());
    out.push_str(&content[..range.start]);
    out.push_str(to);
    out.push_str(&content[range.end..]);
    Ok(out)
}

/// Validate a package name as accepted in a pin token.
pub fn validate_package(package: &str) -> Result<(), ManifestError> {
    if package.is_empty()
        || package
            .chars()
            .any(|c| !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'))
    {
        return Err(ManifestError::InvalidPackage(package.to_string()));
    }
    Ok(())
}

fn validate_version(version: &str) -> Result<(), ManifestError> {
    if version.is_empty()
        || version
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | ',' | ';' | '/'))
    {
        return Err(ManifestError::InvalidVersion(version.to_string()));
    }
    Ok(())
}

/// Byte range of the version inside the single pin for `package`.
fn find_pin(content: &str, package: &str) -> Result<Range<usize>, ManifestError> {
    validate_package(package)?;
    let pattern = format!(
        r#"["']{}==(?P<version>[^"'\s,;\]]+)"#,
        regex::escape(package)
    );
    let re = Regex::new(&pattern).map_err(|_| ManifestError::InvalidPackage(package.to_string()))?;

    let mut versions = re
        .captures_iter(content)
        .filter_map(|caps| caps.name("version"))
        .map(|m| m.range());
    let first = versions.next().ok_or_else(|| ManifestError::TokenNotFound {
        package: package.to_string(),
        reason: "no quoted name==version pin".to_string(),
    })?;
    let extra = versions.count();
    if extra > 0 {
        return Err(ManifestError::TokenNotFound {
            package: package.to_string(),
            reason: format!("{} pins declared, refusing to guess", extra + 1),
        });
    }
    Ok(first)
}
