//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! chain / resilience / http produce:
//!     → tracing events (attempts, retries, assertion failures)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout)
//!     → whatever `metrics` recorder the application installs
//! ```

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
