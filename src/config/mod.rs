//! Configuration system
//!
//! Loads ~/.config/agilesync/config.yaml with:
//! - JIRA site URLs and credential sources
//! - Customer and integration instance ids stamped on every entity
//! - Sync tuning (concurrency, page size, historical mode, retries)
//! - Output, state and webhook receiver locations

mod sync_config;
pub mod validation;

pub use sync_config::{JiraConfig, RetrySettings, ServerConfig, SyncConfig};
pub use validation::{validate_config, validate_config_result, ValidationError};
