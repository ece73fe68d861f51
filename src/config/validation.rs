//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (backoff bounds ordered, timeouts > 0)
//! - Check that the base URL parses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AssertConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use url::Url;

use crate::config::schema::AssertConfig;

/// One semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field (e.g., "retries.max_backoff_ms").
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub fn validate_config(config: &AssertConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Some(base) = &config.client.base_url {
        match Url::parse(base) {
            Ok(url) if url.cannot_be_a_base() => {
                errors.push(ValidationError::new("client.base_url", "must be a hierarchical URL"));
            }
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::new("client.base_url", e.to_string())),
        }
    }

    if config.client.user_agent.trim().is_empty() {
        errors.push(ValidationError::new("client.user_agent", "must not be empty"));
    }

    let retries = &config.retries;
    if retries.min_backoff_ms > retries.max_backoff_ms {
        errors.push(ValidationError::new(
            "retries.min_backoff_ms",
            format!(
                "must not exceed max_backoff_ms ({} > {})",
                retries.min_backoff_ms, retries.max_backoff_ms
            ),
        ));
    }

    if config.timeouts.attempt_ms == Some(0) {
        errors.push(ValidationError::new("timeouts.attempt_ms", "must be greater than zero"));
    }
    if config.timeouts.total_ms == Some(0) {
        errors.push(ValidationError::new("timeouts.total_ms", "must be greater than zero"));
    }

    if config.observability.log_level.trim().is_empty() {
        errors.push(ValidationError::new("observability.log_level", "must not be empty"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
