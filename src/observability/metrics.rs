//! Metrics collection.
//!
//! # Metrics
//! - `http_assert_attempts_total` (counter): attempts sent
//! - `http_assert_retries_total` (counter): retries by reason (timeout, error)
//! - `http_assert_requests_total` (counter): logical requests by outcome
//! - `http_assert_request_duration_seconds` (histogram): logical request latency
//! - `http_assert_assertions_total` (counter): assertions by result
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; installing a recorder is left
//!   to the embedding application
//! - Without a recorder every call is a no-op

use std::time::Duration;

pub fn record_attempt() {
    ::metrics::counter!("http_assert_attempts_total").increment(1);
}

pub fn record_retry(reason: &'static str) {
    ::metrics::counter!("http_assert_retries_total", "reason" => reason).increment(1);
}

pub fn record_request(outcome: &'static str, elapsed: Duration) {
    ::metrics::counter!("http_assert_requests_total", "outcome" => outcome).increment(1);
    ::metrics::histogram!("http_assert_request_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_assertion(passed: bool) {
    let result = if passed { "success" } else { "failure" };
    ::metrics::counter!("http_assert_assertions_total", "result" => result).increment(1);
}
