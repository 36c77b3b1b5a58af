//! Ticket sink: create `Story` issues through the tracker's REST API.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{looks_rate_limited, ToolError};
use crate::config::JiraConfig;

/// Sink that turns an approved story into a tracker issue.
#[async_trait]
pub trait TicketSink: Send + Sync {
    /// Create one ticket and return its issue key (e.g. `SDLC-42`).
    async fn create(&self, summary: &str, description: &str) -> Result<String, ToolError>;
}

/// Jira-backed sink using basic auth against `/rest/api/2/issue`.
pub struct JiraSink {
    config: JiraConfig,
    client: reqwest::Client,
}

impl JiraSink {
    pub fn new(mut config: JiraConfig) -> Self {
        config.url = config.url.trim_end_matches('/').to_string();
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

/// Request body for issue creation. Issue type is always `Story`.
pub fn issue_fields(project_key: &str, summary: &str, description: &str) -> Value {
    json!({
        "fields": {
            "project": { "key": project_key },
            "summary": summary,
            "description": description,
            "issuetype": { "name": "Story" }
        }
    })
}

#[derive(Deserialize)]
struct CreateIssueResponse {
    key: Option<String>,
}

#[async_trait]
impl TicketSink for JiraSink {
    async fn create(&self, summary: &str, description: &str) -> Result<String, ToolError> {
        let url = format!("{}/rest/api/2/issue", self.config.url);
        debug!(%url, summary, "creating tracker issue");

        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.config.username, Some(&self.config.api_token))
            .json(&issue_fields(&self.config.project_key, summary, description))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            if looks_rate_limited(status.as_u16(), &body) {
                return Err(ToolError::RateLimited(body));
            }
            return Err(ToolError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CreateIssueResponse = resp.json().await?;
        let key = parsed.key.ok_or(ToolError::MissingField("key"))?;
        info!(%key, "created tracker issue");
        Ok(key)
    }
}
