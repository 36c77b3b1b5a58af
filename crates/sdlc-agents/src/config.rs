//! Pipeline configuration: environment-driven defaults with optional TOML
//! file overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::stories::ParserStyle;

/// Where requirement documents and story files live.
#[derive(Debug, Clone)]
pub enum StorageBackend {
    /// Direct file I/O under a root directory.
    Local { root: PathBuf },
    /// Remote file service (`/read-file`, `/write-file/`).
    Remote { base_url: String },
}

/// Tracker endpoint and credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct JiraConfig {
    pub url: String,
    pub username: String,
    pub api_token: String,
    #[serde(default = "default_project_key")]
    pub project_key: String,
}

fn default_project_key() -> String {
    "SDLC".to_string()
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub storage: StorageBackend,
    /// Tracker endpoint; `None` when the environment is incomplete.
    pub jira: Option<JiraConfig>,
    /// Whole-run attempts when the upstream rate-limits.
    pub max_attempts: u32,
    /// Backoff between rate-limited attempts.
    pub retry_backoff: Duration,
    /// Hard bound on exchange rounds per run.
    pub max_rounds: u32,
    pub parser_style: ParserStyle,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            storage: match std::env::var("TOOL_APP_URL") {
                Ok(base_url) => StorageBackend::Remote { base_url },
                Err(_) => StorageBackend::Local {
                    root: std::env::var("SDLC_DATA_DIR")
                        .map(PathBuf::from)
                        .unwrap_or_else(|_| PathBuf::from("input")),
                },
            },
            jira: Self::jira_from_env(),
            max_attempts: 3,
            retry_backoff: Duration::from_secs(60),
            max_rounds: 100,
            parser_style: ParserStyle::Simple,
        }
    }
}

impl PipelineConfig {
    fn jira_from_env() -> Option<JiraConfig> {
        let url = std::env::var("JIRA_INSTANCE_URL").ok()?;
        let username = std::env::var("JIRA_USERNAME").ok()?;
        let api_token = std::env::var("JIRA_API_TOKEN").ok()?;
        let project_key =
            std::env::var("JIRA_PROJECT_KEY").unwrap_or_else(|_| default_project_key());
        Some(JiraConfig {
            url,
            username,
            api_token,
            project_key,
        })
    }

    /// Load a TOML config file on top of the env-driven defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let file: ConfigFile = toml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        let mut config = Self::default();
        if let Some(storage) = file.storage {
            if let Some(base_url) = storage.base_url {
                config.storage = StorageBackend::Remote { base_url };
            } else if let Some(root) = storage.root {
                config.storage = StorageBackend::Local { root };
            }
        }
        if let Some(jira) = file.jira {
            config.jira = Some(jira);
        }
        if let Some(retry) = file.retry {
            if let Some(max_attempts) = retry.max_attempts {
                config.max_attempts = max_attempts;
            }
            if let Some(secs) = retry.backoff_secs {
                config.retry_backoff = Duration::from_secs(secs);
            }
        }
        if let Some(max_rounds) = file.max_rounds {
            config.max_rounds = max_rounds;
        }
        if let Some(style) = file.parser_style {
            config.parser_style = style;
        }
        Ok(config)
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    storage: Option<StorageSection>,
    jira: Option<JiraConfig>,
    retry: Option<RetrySection>,
    max_rounds: Option<u32>,
    parser_style: Option<ParserStyle>,
}

#[derive(Deserialize)]
struct StorageSection {
    root: Option<PathBuf>,
    base_url: Option<String>,
}

#[derive(Deserialize)]
struct RetrySection {
    max_attempts: Option<u32>,
    backoff_secs: Option<u64>,
}
