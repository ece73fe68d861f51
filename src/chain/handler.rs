//! Assertion sinks.
//!
//! Every chain reports to an [`AssertionHandler`]. The default handler
//! renders failures with a [`Formatter`] and hands the text to a
//! [`Reporter`], which decides what "failing" means for the caller.

use std::sync::{Arc, Mutex};

use crate::chain::context::AssertionContext;
use crate::chain::failure::{Failure, Severity};
use crate::observability::metrics;

/// Receives assertion outcomes.
pub trait AssertionHandler: Send + Sync {
    /// Called when an assertion scope is left without failure.
    fn success(&self, ctx: &AssertionContext);

    /// Called once per branch, with the first failure.
    fn failure(&self, ctx: &AssertionContext, failure: &Failure);
}

/// Renders failures as text.
pub trait Formatter: Send + Sync {
    fn format_failure(&self, ctx: &AssertionContext, failure: &Failure) -> String;
}

/// Delivers formatted failures.
pub trait Reporter: Send + Sync {
    fn report(&self, severity: Severity, message: &str);
}

/// Line-oriented formatter.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFormatter;

impl Formatter for DefaultFormatter {
    fn format_failure(&self, ctx: &AssertionContext, failure: &Failure) -> String {
        let mut out = String::new();
        out.push_str(&format!("assertion: {}\n", ctx.alias_string()));
        if let Some(test) = &ctx.test_name {
            out.push_str(&format!("test: {}\n", test));
        }
        if let Some(request) = &ctx.request {
            out.push_str(&format!(
                "request: {} {} ({})\n",
                request.method, request.url, request.request_id
            ));
        }
        if let Some(response) = &ctx.response {
            out.push_str(&format!(
                "response: {} after {} attempt(s)\n",
                response.status, response.attempts
            ));
        }
        out.push_str(&format!("kind: {}\n", failure.kind));
        for cause in failure.causes() {
            out.push_str(&format!("error: {}\n", cause));
        }
        if let Some(expected) = &failure.expected {
            out.push_str(&format!("expected: {}\n", expected));
        }
        if let Some(actual) = &failure.actual {
            out.push_str(&format!("actual: {}\n", actual));
        }
        if let Some(reference) = &failure.reference {
            out.push_str(&format!("reference: {}\n", reference));
        }
        if let Some(delta) = &failure.delta {
            out.push_str(&format!("delta: {}\n", delta));
        }
        out
    }
}

/// Panics on fatal failures, logs non-fatal ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanicReporter;

impl Reporter for PanicReporter {
    fn report(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Fatal => panic!("{}", message),
            Severity::NonFatal => tracing::warn!("{}", message),
        }
    }
}

/// Logs every failure and never panics.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Fatal => tracing::error!("{}", message),
            Severity::NonFatal => tracing::warn!("{}", message),
        }
    }
}

/// Formatter + reporter pair.
#[derive(Clone)]
pub struct DefaultHandler {
    formatter: Arc<dyn Formatter>,
    reporter: Arc<dyn Reporter>,
}

impl DefaultHandler {
    pub fn new(formatter: Arc<dyn Formatter>, reporter: Arc<dyn Reporter>) -> Self {
        Self { formatter, reporter }
    }

    /// Default formatter with a reporter that panics on fatal failures.
    pub fn panicking() -> Self {
        Self::new(Arc::new(DefaultFormatter), Arc::new(PanicReporter))
    }

    /// Default formatter with a reporter that only logs.
    pub fn logging() -> Self {
        Self::new(Arc::new(DefaultFormatter), Arc::new(LogReporter))
    }
}

impl Default for DefaultHandler {
    fn default() -> Self {
        Self::panicking()
    }
}

impl AssertionHandler for DefaultHandler {
    fn success(&self, ctx: &AssertionContext) {
        tracing::trace!(path = %ctx.path_string(), "Assertion passed");
        metrics::record_assertion(true);
    }

    fn failure(&self, ctx: &AssertionContext, failure: &Failure) {
        metrics::record_assertion(false);
        let message = self.formatter.format_failure(ctx, failure);
        self.reporter.report(failure.severity, &message);
    }
}

/// One event observed by a [`RecordingHandler`].
#[derive(Debug, Clone)]
pub enum Event {
    Success(AssertionContext),
    Failure(AssertionContext, Failure),
}

/// Collects events instead of reporting them.
#[derive(Debug, Clone, Default)]
pub struct RecordingHandler {
    events: Arc<Mutex<Vec<Event>>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events, oldest first.
    pub fn events(&self) -> Vec<Event> {
        self.lock().clone()
    }

    /// Recorded failures, oldest first.
    pub fn failures(&self) -> Vec<Failure> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                Event::Failure(_, f) => Some(f.clone()),
                Event::Success(_) => None,
            })
            .collect()
    }

    /// Literal paths of recorded successes, oldest first.
    pub fn successes(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                Event::Success(ctx) => Some(ctx.path_string()),
                Event::Failure(..) => None,
            })
            .collect()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Event>> {
        // a panicking reporter elsewhere must not hide what was recorded
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl AssertionHandler for RecordingHandler {
    fn success(&self, ctx: &AssertionContext) {
        self.lock().push(Event::Success(ctx.clone()));
    }

    fn failure(&self, ctx: &AssertionContext, failure: &Failure) {
        self.lock().push(Event::Failure(ctx.clone(), failure.clone()));
    }
}
