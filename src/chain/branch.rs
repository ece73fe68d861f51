//! Per-branch assertion state.
//!
//! # State Transitions
//! ```text
//! ok ──fail()──▶ failed
//! failed ──reset()──▶ ok      (test harness only)
//! ```
//!
//! # Design Decisions
//! - Every derived fluent value gets its own clone; branches never share a
//!   failure flag
//! - The first failure wins; later failures on the same branch are dropped
//! - Ancestors are reachable only through a shared `Lineage` node holding a
//!   "descendant failed" flag, so a chain never owns its parent

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::chain::context::{AssertionContext, RequestInfo, ResponseInfo};
use crate::chain::failure::{Failure, Severity};
use crate::chain::handler::AssertionHandler;

/// Invoked after a branch records its first failure.
pub type FailCallback = Arc<dyn Fn(&Failure) + Send + Sync>;

/// Failure indicator shared between a chain and the clones derived from it.
#[derive(Debug, Default)]
struct Lineage {
    descendant_failed: AtomicBool,
    parent: Option<Arc<Lineage>>,
}

impl Lineage {
    fn child_of(parent: &Arc<Lineage>) -> Self {
        Self {
            descendant_failed: AtomicBool::new(false),
            parent: Some(Arc::clone(parent)),
        }
    }

    /// Raise the indicator on every ancestor.
    fn flag_ancestors(&self) {
        let mut next = self.parent.as_ref();
        while let Some(node) = next {
            node.descendant_failed.store(true, Ordering::Relaxed);
            next = node.parent.as_ref();
        }
    }
}

/// Assertion path and failure state of one branch.
pub struct Chain {
    context: AssertionContext,
    handler: Arc<dyn AssertionHandler>,
    severity: Severity,
    failed: bool,
    /// Open `enter` calls made on this chain (not inherited by clones).
    depth: usize,
    lineage: Arc<Lineage>,
    fail_callback: Option<FailCallback>,
}

impl Chain {
    /// Create a root chain.
    pub fn new(context: AssertionContext, handler: Arc<dyn AssertionHandler>) -> Self {
        Self {
            context,
            handler,
            severity: Severity::default(),
            failed: false,
            depth: 0,
            lineage: Arc::new(Lineage::default()),
            fail_callback: None,
        }
    }

    /// Set the branch severity. Inherited by clones made afterwards.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Push a path segment. Must be paired with [`leave`](Self::leave).
    pub fn enter(&mut self, segment: &str) {
        self.context.push(segment);
        self.depth += 1;
    }

    /// Report success (unless failed) and pop the last path segment.
    ///
    /// # Panics
    /// If called without a matching [`enter`](Self::enter) on this chain.
    pub fn leave(&mut self) {
        if self.depth == 0 {
            panic!(
                "unpaired Chain::leave() at path \"{}\"",
                self.context.path_string()
            );
        }
        if !self.failed {
            self.handler.success(&self.context);
        }
        self.context.pop();
        self.depth -= 1;
    }

    /// Run `f` between `enter(segment)` and `leave()`.
    pub fn scoped<R>(&mut self, segment: &str, f: impl FnOnce(&mut Chain) -> R) -> R {
        self.enter(segment);
        let result = f(self);
        self.leave();
        result
    }

    /// Clone with an extra path segment baked in. The segment is part of the
    /// new branch's context, not of its enter/leave stack.
    pub fn derive(&self, segment: &str) -> Chain {
        let mut child = self.clone();
        child.context.push(segment);
        child
    }

    /// Record a failure. No-op once the branch has failed.
    pub fn fail(&mut self, mut failure: Failure) {
        if self.failed {
            tracing::trace!(
                path = %self.context.path_string(),
                kind = %failure.kind,
                "Dropping failure on already failed branch"
            );
            return;
        }
        self.failed = true;
        self.lineage.flag_ancestors();

        failure.severity = self.severity;
        tracing::debug!(
            path = %self.context.path_string(),
            kind = %failure.kind,
            severity = ?failure.severity,
            "Assertion failed"
        );

        // the handler may panic, so the callback goes first
        if let Some(callback) = &self.fail_callback {
            callback(&failure);
        }
        self.handler.failure(&self.context, &failure);
    }

    /// Whether this branch has failed.
    pub fn failed(&self) -> bool {
        self.failed
    }

    /// Whether any chain cloned (transitively) from this one has failed.
    pub fn descendant_failed(&self) -> bool {
        self.lineage.descendant_failed.load(Ordering::Relaxed)
    }

    /// Clear the failure state. For test harnesses only; assertion code
    /// never calls this.
    pub fn reset(&mut self) {
        self.failed = false;
        self.lineage.descendant_failed.store(false, Ordering::Relaxed);
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn set_severity(&mut self, severity: Severity) {
        self.severity = severity;
    }

    pub fn context(&self) -> &AssertionContext {
        &self.context
    }

    /// Replace the user-facing path with a single name until the current
    /// segment is left.
    pub fn set_alias(&mut self, alias: &str) {
        self.context.set_alias(alias);
    }

    pub fn set_request_name(&mut self, name: &str) {
        self.context.request_name = Some(name.to_string());
    }

    pub fn set_request(&mut self, request: RequestInfo) {
        self.context.request = Some(Arc::new(request));
    }

    pub fn set_response(&mut self, response: ResponseInfo) {
        self.context.response = Some(Arc::new(response));
    }

    pub fn set_rtt(&mut self, rtt: Duration) {
        self.context.rtt = Some(rtt);
    }

    /// Install a callback run after the first failure of this branch and of
    /// clones made afterwards.
    pub fn set_fail_callback(&mut self, callback: FailCallback) {
        self.fail_callback = Some(callback);
    }
}

impl Clone for Chain {
    /// Independent copy: same context values, fresh path vectors, same
    /// failure flag, and a new lineage node under this chain's.
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            handler: Arc::clone(&self.handler),
            severity: self.severity,
            failed: self.failed,
            depth: 0,
            lineage: Arc::new(Lineage::child_of(&self.lineage)),
            fail_callback: self.fail_callback.clone(),
        }
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("path", &self.context.path)
            .field("severity", &self.severity)
            .field("failed", &self.failed)
            .field("depth", &self.depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::failure::AssertionKind;
    use crate::chain::handler::{DefaultHandler, RecordingHandler};
    use std::sync::atomic::AtomicUsize;

    fn root() -> (Chain, RecordingHandler) {
        let handler = RecordingHandler::new();
        let chain = Chain::new(AssertionContext::default(), Arc::new(handler.clone()));
        (chain, handler)
    }

    #[test]
    fn enter_leave_is_balanced() {
        let (mut chain, handler) = root();
        chain.enter("request()");
        let before = chain.context().path.len();

        chain.enter("expect()");
        chain.enter("status()");
        chain.leave();
        chain.leave();

        assert_eq!(chain.context().path.len(), before);
        assert_eq!(
            handler.successes(),
            vec!["request().expect().status()", "request().expect()"]
        );
    }

    #[test]
    #[should_panic(expected = "unpaired Chain::leave()")]
    fn leave_without_enter_panics() {
        let (mut chain, _) = root();
        chain.leave();
    }

    #[test]
    #[should_panic(expected = "unpaired Chain::leave()")]
    fn clone_cannot_leave_parent_scope() {
        let (mut chain, _) = root();
        chain.enter("body()");
        let mut child = chain.clone();
        child.leave();
    }

    #[test]
    fn first_failure_wins() {
        let (mut chain, handler) = root();
        chain.enter("is_equal()");
        chain.fail(Failure::message(AssertionKind::IsEqual, "A"));
        chain.fail(Failure::message(AssertionKind::NotEmpty, "B"));
        chain.leave();

        assert!(chain.failed());
        let failures = handler.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].summary(), "A");
        // failed branches report no success
        assert!(handler.successes().is_empty());
    }

    #[test]
    fn clone_copies_path_without_aliasing() {
        let (mut chain, _) = root();
        chain.enter("json()");
        let mut child = chain.clone();
        child.enter("field(\"id\")");

        assert_eq!(chain.context().path, vec!["json()"]);
        assert_eq!(child.context().path, vec!["json()", "field(\"id\")"]);
        child.leave();
        chain.leave();
    }

    #[test]
    fn clone_inherits_failure_flag_by_value() {
        let (mut chain, handler) = root();
        let mut sibling = chain.clone();
        sibling.fail(Failure::message(AssertionKind::IsEqual, "sibling"));

        assert!(!chain.failed());
        assert!(chain.descendant_failed());

        chain.fail(Failure::message(AssertionKind::IsEqual, "parent"));
        let late = chain.clone();
        assert!(late.failed());
        assert_eq!(handler.failures().len(), 2);
    }

    #[test]
    fn descendant_flag_reaches_all_ancestors() {
        let (root_chain, _) = root();
        let middle = root_chain.clone();
        let mut leaf = middle.clone();
        leaf.fail(Failure::message(AssertionKind::NotEmpty, "leaf"));

        assert!(middle.descendant_failed());
        assert!(root_chain.descendant_failed());
        assert!(!leaf.descendant_failed());
    }

    #[test]
    fn severity_is_stamped_from_branch() {
        let (chain, handler) = root();
        let mut chain = chain.with_severity(Severity::NonFatal);
        let mut child = chain.clone();
        child.fail(Failure::message(AssertionKind::IsEqual, "x"));
        assert_eq!(handler.failures()[0].severity, Severity::NonFatal);

        chain.set_severity(Severity::Fatal);
        chain.fail(Failure::message(AssertionKind::IsEqual, "y"));
        assert_eq!(handler.failures()[1].severity, Severity::Fatal);
    }

    #[test]
    fn fail_callback_runs_once() {
        let (mut chain, _) = root();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        chain.set_fail_callback(Arc::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        chain.fail(Failure::message(AssertionKind::Operation, "first"));
        chain.fail(Failure::message(AssertionKind::Operation, "second"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let mut child = chain.clone();
        child.reset();
        child.fail(Failure::message(AssertionKind::Operation, "child"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn fail_callback_runs_before_panicking_handler() {
        let mut chain = Chain::new(
            AssertionContext::default(),
            Arc::new(DefaultHandler::panicking()),
        );
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        chain.set_fail_callback(Arc::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            chain.fail(Failure::message(AssertionKind::IsEqual, "status mismatch"));
        }));

        assert!(outcome.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn derive_extends_path_of_child_only() {
        let (mut chain, _) = root();
        chain.enter("each()");
        let child = chain.derive("[2]");
        chain.leave();

        assert_eq!(child.context().path, vec!["each()", "[2]"]);
        assert!(chain.context().path.is_empty());
    }

    #[test]
    fn reset_clears_flag() {
        let (mut chain, _) = root();
        chain.fail(Failure::message(AssertionKind::Operation, "x"));
        chain.reset();
        assert!(!chain.failed());
    }

    #[test]
    fn alias_replaces_user_facing_path() {
        let (mut chain, _) = root();
        chain.enter("request(\"GET\", \"/users\")");
        chain.enter("expect()");
        chain.set_alias("users");
        chain.enter("status()");

        assert_eq!(chain.context().alias_string(), "users.status()");
        assert_eq!(
            chain.context().path_string(),
            "request(\"GET\", \"/users\").expect().status()"
        );
        chain.leave();
        assert_eq!(chain.context().alias_string(), "users");
        chain.leave();
        assert_eq!(chain.context().alias_string(), "request(\"GET\", \"/users\")");
    }

    #[test]
    fn scoped_pairs_even_on_failure() {
        let (mut chain, handler) = root();
        chain.scoped("not_empty()", |c| {
            c.fail(Failure::message(AssertionKind::NotEmpty, "empty"));
        });
        assert!(chain.context().path.is_empty());
        assert_eq!(handler.failures().len(), 1);
    }
}
