//! Storage shim: read and write text files, directly or via the remote
//! file-service endpoints.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::{looks_rate_limited, sandbox_check, ToolError};

/// Text-file storage the pipeline reads requirements from and writes
/// stories (and code skeletons) to.
#[async_trait]
pub trait StorageShim: Send + Sync {
    async fn read(&self, path: &str) -> Result<String, ToolError>;
    async fn write(&self, path: &str, content: &str) -> Result<(), ToolError>;
}

/// Direct file I/O under a root directory. Paths must stay inside the root;
/// parent directories are created on write.
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }
}

#[async_trait]
impl StorageShim for FsStorage {
    async fn read(&self, path: &str) -> Result<String, ToolError> {
        let full = sandbox_check(&self.root, path)?;
        Ok(std::fs::read_to_string(&full)?)
    }

    async fn write(&self, path: &str, content: &str) -> Result<(), ToolError> {
        let full = sandbox_check(&self.root, path)?;
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&full, content)?;
        debug!(path, bytes = content.len(), "wrote file");
        Ok(())
    }
}

/// Remote file service: `POST /read-file` and `POST /write-file/`.
///
/// Non-2xx responses surface the response body in the error so the caller
/// sees what the service complained about.
pub struct HttpStorage {
    base_url: String,
    client: reqwest::Client,
}

impl HttpStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ToolError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        if looks_rate_limited(status.as_u16(), &body) {
            return Err(ToolError::RateLimited(body));
        }
        Err(ToolError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

#[derive(Deserialize)]
struct ReadFileResponse {
    content: Option<String>,
}

#[async_trait]
impl StorageShim for HttpStorage {
    async fn read(&self, path: &str) -> Result<String, ToolError> {
        let url = format!("{}/read-file", self.base_url);
        debug!(%url, path, "reading file via API");
        let resp = self
            .client
            .post(&url)
            .json(&json!({ "file_path": path }))
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        let parsed: ReadFileResponse = resp.json().await?;
        parsed.content.ok_or(ToolError::MissingField("content"))
    }

    async fn write(&self, path: &str, content: &str) -> Result<(), ToolError> {
        let url = format!("{}/write-file/", self.base_url);
        debug!(%url, path, "writing file via API");
        let resp = self
            .client
            .post(&url)
            .json(&json!({ "file_path": path, "content": content }))
            .send()
            .await?;
        Self::check_status(resp).await?;
        info!(path, "wrote file via API");
        Ok(())
    }
}
