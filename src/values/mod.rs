//! Fluent values derived from a response.
//!
//! Only the handful of matchers needed to drive chains; every method enters
//! its own path segment, checks `failed()` first, and returns a usable value
//! even when the branch has already failed.

pub mod json;
pub mod number;
pub mod string;

pub use json::JsonValue;
pub use number::NumberValue;
pub use string::StringValue;

#[cfg(test)]
pub(crate) fn test_chain() -> (crate::chain::Chain, crate::chain::RecordingHandler) {
    use std::sync::Arc;

    let handler = crate::chain::RecordingHandler::new();
    let chain = crate::chain::Chain::new(
        crate::chain::AssertionContext::default(),
        Arc::new(handler.clone()),
    );
    (chain, handler)
}
