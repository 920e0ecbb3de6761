//! agilesync configuration file handling
//!
//! Loads and manages ~/.config/agilesync/config.yaml.

use crate::agile::{Credentials, RetryConfig, SyncOptions};
use crate::{AgileSyncError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// JIRA connection settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JiraConfig {
    /// Base URL of the JIRA site, e.g. https://acme.atlassian.net
    pub api_url: String,

    /// Base for browser links; `api_url` when empty
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub website_url: String,

    /// Environment variable holding a bearer token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,

    /// Basic auth user, paired with `password_env`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Environment variable holding the basic auth password or API token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
}

/// Webhook receiver settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Retry settings for provider calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig::from_millis(self.max_retries, self.initial_backoff_ms, self.max_backoff_ms)
    }
}

/// agilesync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub jira: JiraConfig,

    pub customer_id: String,

    pub integration_instance_id: String,

    /// Concurrent board/sprint tasks
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_page_size")]
    pub page_size: u64,

    /// Re-emit closed sprints that were already synced
    #[serde(default)]
    pub historical: bool,

    /// SQLite file holding sprint sync markers
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    /// JSON Lines file records are appended to
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub retry: RetrySettings,
}

fn default_concurrency() -> usize {
    crate::agile::pool::DEFAULT_CONCURRENCY
}

fn default_page_size() -> u64 {
    crate::agile::fetch::DEFAULT_PAGE_SIZE
}

fn config_dir() -> PathBuf {
    // Always use ~/.config for consistency across platforms (macOS, Linux)
    let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(".config");
    path.push("agilesync");
    path
}

fn default_state_path() -> PathBuf {
    config_dir().join("state.db")
}

fn default_output_path() -> PathBuf {
    PathBuf::from("agile.jsonl")
}

impl SyncConfig {
    pub fn new(
        api_url: impl Into<String>,
        customer_id: impl Into<String>,
        integration_instance_id: impl Into<String>,
    ) -> Self {
        Self {
            jira: JiraConfig {
                api_url: api_url.into(),
                ..Default::default()
            },
            customer_id: customer_id.into(),
            integration_instance_id: integration_instance_id.into(),
            concurrency: default_concurrency(),
            page_size: default_page_size(),
            historical: false,
            state_path: default_state_path(),
            output_path: default_output_path(),
            server: ServerConfig::default(),
            retry: RetrySettings::default(),
        }
    }

    /// Load configuration from the default path (~/.config/agilesync/config.yaml)
    pub fn load_default() -> Result<Self> {
        Self::load(Self::default_path())
    }

    /// Load configuration from a specific path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(AgileSyncError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), "Loading agilesync configuration");

        let content = fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;

        tracing::debug!(
            api_url = %config.jira.api_url,
            concurrency = config.concurrency,
            historical = config.historical,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "Saving agilesync configuration");

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;

        Ok(())
    }

    /// Get the default config path (~/.config/agilesync/config.yaml)
    pub fn default_path() -> PathBuf {
        config_dir().join("config.yaml")
    }

    /// Resolve credentials from the environment.
    ///
    /// A bearer token wins over basic auth; neither configured means
    /// anonymous requests.
    pub fn credentials(&self) -> Result<Credentials> {
        if let Some(ref var) = self.jira.token_env {
            let token = std::env::var(var).map_err(|_| {
                AgileSyncError::Config(format!("Environment variable {} is not set", var))
            })?;
            return Ok(Credentials::Bearer(token));
        }

        if let Some(ref username) = self.jira.username {
            let password = match self.jira.password_env {
                Some(ref var) => std::env::var(var).map_err(|_| {
                    AgileSyncError::Config(format!("Environment variable {} is not set", var))
                })?,
                None => String::new(),
            };
            return Ok(Credentials::Basic {
                username: username.clone(),
                password,
            });
        }

        Ok(Credentials::None)
    }

    pub fn to_sync_options(&self) -> Result<SyncOptions> {
        let mut options = SyncOptions::new(
            &self.jira.api_url,
            &self.customer_id,
            &self.integration_instance_id,
        );
        options.website_url = self.jira.website_url.clone();
        options.credentials = self.credentials()?;
        options.historical = self.historical;
        options.concurrency = self.concurrency;
        options.page_size = self.page_size;
        options.retry = self.retry.to_retry_config();
        Ok(options)
    }
}
