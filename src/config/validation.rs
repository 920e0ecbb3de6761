//! Configuration validation
//!
//! Collects every problem in a [`SyncConfig`] instead of stopping at the
//! first one, so `agilesync validate` can report them together.

use super::sync_config::SyncConfig;
use std::net::SocketAddr;

/// Validation error details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub context: Option<String>,
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            context: None,
            field: field.into(),
            message: message.into(),
        }
    }

    fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref ctx) = self.context {
            write!(f, "[{}] {}: {}", ctx, self.field, self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

/// Validation result
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Validate an agilesync configuration
pub fn validate_config(config: &SyncConfig) -> ValidationResult {
    let mut errors = Vec::new();

    if let Err(mut jira_errors) = validate_jira(config) {
        errors.append(&mut jira_errors);
    }

    if config.customer_id.trim().is_empty() {
        errors.push(ValidationError::new("customer_id", "Customer id cannot be empty"));
    }

    if config.integration_instance_id.trim().is_empty() {
        errors.push(ValidationError::new(
            "integration_instance_id",
            "Integration instance id cannot be empty",
        ));
    }

    if config.concurrency == 0 {
        errors.push(ValidationError::new(
            "concurrency",
            "Concurrency must be greater than 0",
        ));
    }

    if config.page_size == 0 {
        errors.push(ValidationError::new(
            "page_size",
            "Page size must be greater than 0",
        ));
    }

    if config.server.bind.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind",
            format!("Invalid bind address: {}", config.server.bind),
        ));
    }

    if config.retry.initial_backoff_ms > config.retry.max_backoff_ms {
        errors.push(ValidationError::new(
            "retry.initial_backoff_ms",
            "Initial backoff cannot exceed max_backoff_ms",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_jira(config: &SyncConfig) -> ValidationResult {
    let mut errors = Vec::new();
    let jira = &config.jira;

    if jira.api_url.is_empty() {
        errors.push(
            ValidationError::new("api_url", "JIRA API URL cannot be empty").with_context("jira"),
        );
    } else if !is_http_url(&jira.api_url) {
        errors.push(
            ValidationError::new("api_url", format!("Invalid JIRA URL: {}", jira.api_url))
                .with_context("jira"),
        );
    }

    if !jira.website_url.is_empty() && !is_http_url(&jira.website_url) {
        errors.push(
            ValidationError::new(
                "website_url",
                format!("Invalid website URL: {}", jira.website_url),
            )
            .with_context("jira"),
        );
    }

    if jira.password_env.is_some() && jira.username.is_none() {
        errors.push(
            ValidationError::new("username", "password_env is set without a username")
                .with_context("jira"),
        );
    }

    for var in [&jira.token_env, &jira.password_env].into_iter().flatten() {
        if std::env::var(var).is_err() {
            tracing::warn!(
                env_var = %var,
                "Environment variable not set (this may be intentional if set at runtime)"
            );
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate and return a single error listing every problem
pub fn validate_config_result(config: &SyncConfig) -> crate::Result<()> {
    validate_config(config).map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        crate::AgileSyncError::Config(format!(
            "Configuration validation failed:\n  - {}",
            messages.join("\n  - ")
        ))
    })
}
