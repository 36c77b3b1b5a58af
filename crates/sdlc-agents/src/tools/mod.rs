//! External collaborators: the storage shim and the ticket sink.
//!
//! Both sit behind traits so the driver can run against in-memory fakes in
//! tests. Leaf errors are typed here; the orchestration layer wraps them
//! with `anyhow` context.

pub mod jira;
pub mod storage;

use std::path::{Component, Path, PathBuf};

/// Errors that can occur while talking to an external collaborator.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("path `{0}` escapes the storage root")]
    Sandbox(String),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("API response missing `{0}` field")]
    MissingField(&'static str),

    #[error("rate limited by upstream: {0}")]
    RateLimited(String),

    #[error("payload encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ToolError {
    /// Whether this failure is in the retryable rate-limit class.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

/// Classify an upstream failure: 429s and quota-style messages are the only
/// class the driver retries.
pub fn looks_rate_limited(status: u16, body: &str) -> bool {
    let lower = body.to_lowercase();
    status == 429 || lower.contains("rate limit") || lower.contains("quota")
}

/// Resolve `relative_path` under `root`, rejecting absolute paths and any
/// `..` component before touching the filesystem.
pub fn sandbox_check(root: &Path, relative_path: &str) -> Result<PathBuf, ToolError> {
    let rel = Path::new(relative_path);
    if rel.is_absolute()
        || rel
            .components()
            .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(ToolError::Sandbox(relative_path.to_string()));
    }
    Ok(root.join(rel))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looks_rate_limited_on_429() {
        assert!(looks_rate_limited(429, "Too Many Requests"));
    }

    #[test]
    fn test_looks_rate_limited_on_substring() {
        assert!(looks_rate_limited(500, "Rate limit exceeded, try later"));
        assert!(looks_rate_limited(403, "API quota exhausted"));
    }

    #[test]
    fn test_plain_failure_is_not_rate_limited() {
        assert!(!looks_rate_limited(500, "internal server error"));
        assert!(!ToolError::Api {
            status: 500,
            body: "boom".into()
        }
        .is_rate_limited());
    }

    #[test]
    fn test_sandbox_check_accepts_nested_relative() {
        let root = Path::new("/data");
        let path = sandbox_check(root, "stories/stories_upload.txt").unwrap();
        assert_eq!(path, Path::new("/data/stories/stories_upload.txt"));
    }

    #[test]
    fn test_sandbox_check_rejects_parent_components() {
        let root = Path::new("/data");
        assert!(sandbox_check(root, "../etc/passwd").is_err());
        assert!(sandbox_check(root, "a/../../b").is_err());
    }

    #[test]
    fn test_sandbox_check_rejects_absolute() {
        assert!(sandbox_check(Path::new("/data"), "/etc/passwd").is_err());
    }
}
