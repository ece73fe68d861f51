//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AssertConfig (validated, immutable)
//!     → Expect::from_config / RetryPolicy::from_config
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AssertConfig, AssertionConfig, ClientConfig, ObservabilityConfig, RetryConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
