//! Timeout enforcement and cancellation.
//!
//! # Responsibilities
//! - Provide a monotonic cancellation signal owned outside the executor
//! - Race any future against a per-attempt timer, the overall deadline and
//!   the cancellation signal
//!
//! # Design Decisions
//! - Uses Tokio's timer and watch facilities; nothing polls in a loop
//! - Deadline and cancellation outrank the per-attempt timer so an external
//!   stop is never mistaken for a retryable timeout

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

struct CancelInner {
    tx: watch::Sender<bool>,
    parent: Option<CancelToken>,
}

/// Cancellation signal. Once fired it stays fired.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(CancelInner { tx, parent: None }),
        }
    }

    /// Token that fires when either it or `self` fires.
    pub fn child(&self) -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(CancelInner {
                tx,
                parent: Some(self.clone()),
            }),
        }
    }

    /// Fire the signal. Idempotent.
    pub fn cancel(&self) {
        self.inner.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.tx.borrow()
            || self
                .inner
                .parent
                .as_ref()
                .is_some_and(|parent| parent.is_cancelled())
    }

    /// Resolves once the signal (or an ancestor's) has fired.
    pub fn cancelled(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let rx = self.inner.tx.subscribe();
            match &self.inner.parent {
                Some(parent) => {
                    tokio::select! {
                        _ = wait_fired(rx) => {}
                        _ = parent.cancelled() => {}
                    }
                }
                None => wait_fired(rx).await,
            }
        })
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

async fn wait_fired(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // sender gone without firing: never fires
            std::future::pending::<()>().await;
        }
    }
}

/// Which contender of a [`race`] finished first.
#[derive(Debug, PartialEq, Eq)]
pub enum Race<T> {
    Completed(T),
    /// The per-attempt timer fired.
    TimedOut,
    /// The overall deadline passed.
    DeadlineExceeded,
    Cancelled,
}

/// Run `fut` until it completes, `timeout` or `deadline` passes, or
/// `cancel` fires, whichever comes first. `fut` is dropped if it loses.
pub async fn race<F>(
    fut: F,
    timeout: Option<Instant>,
    deadline: Option<Instant>,
    cancel: &CancelToken,
) -> Race<F::Output>
where
    F: Future,
{
    if cancel.is_cancelled() {
        return Race::Cancelled;
    }

    // disabled branches still need an instant to build their timer
    let never = || Instant::now() + Duration::from_secs(86_400 * 365);
    tokio::pin!(fut);

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Race::Cancelled,
        _ = sleep_until(deadline.unwrap_or_else(never)), if deadline.is_some() => Race::DeadlineExceeded,
        _ = sleep_until(timeout.unwrap_or_else(never)), if timeout.is_some() => Race::TimedOut,
        out = &mut fut => Race::Completed(out),
    }
}
