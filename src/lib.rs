//! Fluent HTTP assertions with retries.
//!
//! ```text
//! Expect ──▶ RequestBuilder ──▶ RetryExecutor ──▶ Transport
//!                                  │   ▲
//!                                  ▼   │ replayed bytes
//!                              BodyReplay
//! Response ──▶ StringValue / JsonValue / NumberValue
//!     every value owns a Chain; failures go to the AssertionHandler
//! ```

// Core subsystems
pub mod body;
pub mod chain;
pub mod http;
pub mod values;

// Cross-cutting concerns
pub mod config;
pub mod observability;
pub mod resilience;

pub use chain::{Chain, DefaultHandler, Failure, RecordingHandler, Severity};
pub use config::AssertConfig;
pub use http::{Expect, RequestBuilder, Response};
