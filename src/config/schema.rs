//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for assertion
//! clients. All types derive Serde traits for deserialization from config
//! files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::chain::Severity;
use crate::resilience::{Growth, RetryPredicate};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AssertConfig {
    /// Target server and default request headers.
    pub client: ClientConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Assertion reporting.
    pub assertions: AssertionConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Prepended to relative request paths (e.g., "http://localhost:8080/api").
    pub base_url: Option<String>,

    /// `User-Agent` sent with every request.
    pub user_agent: String,

    /// Headers added to every request.
    pub default_headers: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            user_agent: concat!("http-assert/", env!("CARGO_PKG_VERSION")).to_string(),
            default_headers: BTreeMap::new(),
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per logical request, including the first.
    pub max_attempts: u32,

    /// Which failures are retried.
    pub retry_on: RetryPredicate,

    /// Delay before the first retry in milliseconds.
    pub min_backoff_ms: u64,

    /// Upper bound on any single delay in milliseconds.
    pub max_backoff_ms: u64,

    /// How the delay grows with each retry.
    pub growth: Growth,

    /// Add up to 10% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            retry_on: RetryPredicate::default(),
            min_backoff_ms: 50,
            max_backoff_ms: 5000,
            growth: Growth::default(),
            jitter: false,
        }
    }
}

/// Timeout configuration. Both limits are off unless set.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Per-attempt timeout in milliseconds.
    pub attempt_ms: Option<u64>,

    /// Overall deadline for one logical request in milliseconds.
    pub total_ms: Option<u64>,
}

/// Assertion reporting configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AssertionConfig {
    /// Severity stamped on failures.
    pub severity: Severity,

    /// Name shown in failure reports.
    pub test_name: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
