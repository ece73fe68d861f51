//! Retry executor.
//!
//! Turns a "send once" capability plus a [`RetryPolicy`] into one final
//! outcome.
//!
//! # Algorithm
//! ```text
//! attempt = 1
//! loop:
//!     cancelled?                       → Cancelled (no send)
//!     attempt == 1: drain body on the blocking pool, raced like a send
//!     body = attempt == 1 ? snapshot : rewind + replay
//!     deadline passed?                 → DeadlineExceeded (no send)
//!     race(send, attempt timer, deadline, cancel)
//!         cancel / deadline            → stop, never retried
//!         attempt timer                → TransportError::Timeout
//!     ok                               → return
//!     not retryable                    → Failed
//!     attempt == max                   → Exhausted
//!     next attempt would start late    → DeadlineExceeded (keeps last error)
//!     race(backoff sleep, deadline, cancel)
//!     attempt += 1
//! ```

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{sleep, Instant};

use crate::body::{BodyError, BodyReplay};
use crate::http::transport::TransportError;
use crate::observability::metrics;
use crate::resilience::retries::RetryPolicy;
use crate::resilience::timeouts::{race, CancelToken, Race};

/// Input to one send attempt.
#[derive(Debug, Clone)]
pub struct Attempt {
    /// 1-based attempt number.
    pub number: u32,
    /// Full request body for this attempt.
    pub body: Vec<u8>,
}

/// Successful outcome.
#[derive(Debug)]
pub struct Executed<T> {
    pub value: T,
    /// Attempts made, including the successful one.
    pub attempts: u32,
    /// Time from the start of execution to completion.
    pub elapsed: Duration,
}

/// Terminal failure of the retry loop.
#[derive(Debug, Error)]
pub enum RetryError {
    #[error("request cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    /// `last` is the error of the most recent completed attempt, if any.
    #[error("deadline exceeded after {attempts} attempt(s)")]
    DeadlineExceeded {
        attempts: u32,
        #[source]
        last: Option<TransportError>,
    },

    #[error("retries exhausted after {attempts} attempt(s): {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("attempt {attempts} failed: {source}")]
    Failed {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("request body unavailable after {attempts} attempt(s): {source}")]
    Body {
        attempts: u32,
        #[source]
        source: BodyError,
    },
}

impl RetryError {
    /// Attempts actually sent.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Cancelled { attempts }
            | RetryError::DeadlineExceeded { attempts, .. }
            | RetryError::Exhausted { attempts, .. }
            | RetryError::Failed { attempts, .. }
            | RetryError::Body { attempts, .. } => *attempts,
        }
    }

    /// Last transport error, if the loop ended on one.
    pub fn last_error(&self) -> Option<&TransportError> {
        match self {
            RetryError::Exhausted { source, .. } | RetryError::Failed { source, .. } => Some(source),
            RetryError::DeadlineExceeded { last, .. } => last.as_ref(),
            _ => None,
        }
    }

    /// Whether the loop was stopped from outside (cancel or deadline).
    pub fn is_interrupted(&self) -> bool {
        matches!(
            self,
            RetryError::Cancelled { .. } | RetryError::DeadlineExceeded { .. }
        )
    }

    fn label(&self) -> &'static str {
        match self {
            RetryError::Cancelled { .. } => "cancelled",
            RetryError::DeadlineExceeded { .. } => "deadline",
            RetryError::Exhausted { .. } => "exhausted",
            RetryError::Failed { .. } => "failed",
            RetryError::Body { .. } => "body",
        }
    }
}

/// Runs one logical request under a retry policy.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    cancel: CancelToken,
    deadline: Option<Instant>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            cancel: CancelToken::new(),
            deadline: None,
        }
    }

    /// Stop when `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Absolute deadline. Combined with the policy's total timeout; the
    /// earlier one wins.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send until success, a non-retryable failure, exhaustion, the deadline
    /// or cancellation.
    pub async fn execute<T, F, Fut>(
        &self,
        body: &mut BodyReplay,
        mut send: F,
    ) -> Result<Executed<T>, RetryError>
    where
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let started = Instant::now();
        let deadline = earliest(
            self.deadline,
            self.policy.total_timeout.map(|t| started + t),
        );
        let max_attempts = self.policy.effective_attempts();
        let mut attempt: u32 = 1;
        let mut last_error: Option<TransportError> = None;

        let result = loop {
            let sent = attempt - 1;
            if self.cancel.is_cancelled() {
                break Err(RetryError::Cancelled { attempts: sent });
            }

            if attempt == 1 {
                if let Err(err) = self.fill_body(body, deadline).await {
                    break Err(err);
                }
            }

            let payload = if attempt > 1 {
                body.replay_bytes()
            } else {
                body.snapshot().map(|c| c.into_inner())
            };
            let payload = match payload {
                Ok(bytes) => bytes,
                Err(source) => break Err(RetryError::Body { attempts: sent, source }),
            };

            let now = Instant::now();
            if deadline.is_some_and(|d| d <= now) {
                break Err(RetryError::DeadlineExceeded {
                    attempts: sent,
                    last: last_error.take(),
                });
            }
            let attempt_timer = self.policy.attempt_timeout.map(|t| now + t);

            tracing::debug!(attempt, max_attempts, bytes = payload.len(), "Sending attempt");
            metrics::record_attempt();

            let attempt_input = Attempt {
                number: attempt,
                body: payload,
            };
            let error = match race(send(attempt_input), attempt_timer, deadline, &self.cancel).await {
                Race::Completed(Ok(value)) => {
                    break Ok(Executed {
                        value,
                        attempts: attempt,
                        elapsed: started.elapsed(),
                    });
                }
                Race::Completed(Err(e)) => e,
                Race::TimedOut => {
                    TransportError::Timeout(self.policy.attempt_timeout.unwrap_or_default())
                }
                Race::DeadlineExceeded => {
                    break Err(RetryError::DeadlineExceeded {
                        attempts: attempt,
                        last: last_error.take(),
                    });
                }
                Race::Cancelled => break Err(RetryError::Cancelled { attempts: attempt }),
            };

            if !self.policy.should_retry(&error) {
                break Err(RetryError::Failed {
                    attempts: attempt,
                    source: error,
                });
            }
            if attempt >= max_attempts {
                break Err(RetryError::Exhausted {
                    attempts: attempt,
                    source: error,
                });
            }

            let delay = self.policy.backoff.delay(attempt);
            if deadline.is_some_and(|d| Instant::now() + delay >= d) {
                tracing::info!(attempt, delay = ?delay, error = %error, "Next attempt would start past deadline");
                break Err(RetryError::DeadlineExceeded {
                    attempts: attempt,
                    last: Some(error),
                });
            }

            tracing::info!(attempt, delay = ?delay, error = %error, "Retrying request");
            metrics::record_retry(if error.is_timeout() { "timeout" } else { "error" });

            match race(sleep(delay), None, deadline, &self.cancel).await {
                Race::Completed(()) | Race::TimedOut => {}
                Race::DeadlineExceeded => {
                    break Err(RetryError::DeadlineExceeded {
                        attempts: attempt,
                        last: Some(error),
                    });
                }
                Race::Cancelled => break Err(RetryError::Cancelled { attempts: attempt }),
            }
            last_error = Some(error);
            attempt += 1;
        };

        if let Err(e) = &result {
            tracing::warn!(attempts = e.attempts(), outcome = e.label(), error = %e, "Request failed");
        }
        result
    }

    /// Read the rest of a streaming body on the blocking pool, racing the
    /// deadline and cancellation. If interrupted, the body stays with the
    /// blocking task, which closes it once the read returns; `body` is left
    /// empty.
    async fn fill_body(&self, body: &mut BodyReplay, deadline: Option<Instant>) -> Result<(), RetryError> {
        if body.is_drained() || body.error().is_some() {
            return Ok(());
        }

        let mut owned = std::mem::replace(body, BodyReplay::empty());
        let task = tokio::task::spawn_blocking(move || {
            // a read error stays cached in the body and surfaces on snapshot
            let _ = owned.fill();
            owned
        });

        match race(task, None, deadline, &self.cancel).await {
            Race::Completed(Ok(filled)) => {
                *body = filled;
                Ok(())
            }
            Race::Completed(Err(join)) => match join.try_into_panic() {
                Ok(payload) => std::panic::resume_unwind(payload),
                Err(_) => Err(RetryError::Cancelled { attempts: 0 }),
            },
            Race::TimedOut | Race::DeadlineExceeded => {
                Err(RetryError::DeadlineExceeded { attempts: 0, last: None })
            }
            Race::Cancelled => Err(RetryError::Cancelled { attempts: 0 }),
        }
    }
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::backoff::Backoff;
    use crate::resilience::retries::RetryPredicate;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::no_retry()
            .with_max_attempts(max_attempts)
            .with_retry_on(RetryPredicate::AllErrors)
            .with_backoff(Backoff::new(Duration::from_millis(100), Duration::from_millis(100)))
    }

    fn refused() -> TransportError {
        TransportError::Connection("refused".into())
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let executor = RetryExecutor::new(policy(3));
        let mut body = BodyReplay::empty();

        let err = executor
            .execute(&mut body, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(refused()) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(err, RetryError::Exhausted { attempts: 3, .. }));
        assert!(err.to_string().contains("3 attempt(s)"));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_and_one_mean_single_attempt() {
        for max in [0, 1] {
            let calls = AtomicU32::new(0);
            let executor = RetryExecutor::new(policy(max));
            let err = executor
                .execute(&mut BodyReplay::empty(), |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(refused()) }
                })
                .await
                .unwrap_err();
            assert_eq!(calls.load(Ordering::SeqCst), 1);
            assert_eq!(err.attempts(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_retries() {
        let calls = AtomicU32::new(0);
        let executor = RetryExecutor::new(policy(5));
        let done = executor
            .execute(&mut BodyReplay::empty(), |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt.number < 3 {
                        Err(refused())
                    } else {
                        Ok(attempt.number)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(done.value, 3);
        assert_eq!(done.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_returns_immediately() {
        let calls = AtomicU32::new(0);
        let executor = RetryExecutor::new(policy(5).with_retry_on(RetryPredicate::TimeoutsOnly));
        let err = executor
            .execute(&mut BodyReplay::empty(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(refused()) }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, RetryError::Failed { attempts: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn every_attempt_sees_full_body() {
        let seen = Mutex::new(Vec::new());
        let executor = RetryExecutor::new(policy(3));
        let mut body = BodyReplay::from_reader(std::io::Cursor::new(b"hello world".to_vec()));

        let _ = executor
            .execute(&mut body, |attempt| {
                seen.lock().unwrap().push(String::from_utf8(attempt.body).unwrap());
                async { Err::<(), _>(refused()) }
            })
            .await;

        assert_eq!(*seen.lock().unwrap(), vec!["hello world"; 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_backoff_prevents_next_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancelToken::new();
        let executor = RetryExecutor::new(
            policy(5).with_backoff(Backoff::new(Duration::from_secs(10), Duration::from_secs(10))),
        )
        .with_cancel(cancel.clone());

        let c = calls.clone();
        let trigger = cancel.clone();
        let err = executor
            .execute(&mut BodyReplay::empty(), move |attempt| {
                c.fetch_add(1, Ordering::SeqCst);
                if attempt.number == 2 {
                    // fire during the sleep that follows attempt 2
                    let trigger = trigger.clone();
                    tokio::spawn(async move {
                        sleep(Duration::from_secs(1)).await;
                        trigger.cancel();
                    });
                }
                async { Err::<(), _>(refused()) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(err, RetryError::Cancelled { attempts: 2 }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_in_flight_attempt() {
        let cancel = CancelToken::new();
        let executor = RetryExecutor::new(policy(3)).with_cancel(cancel.clone());
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = executor
            .execute(&mut BodyReplay::empty(), |_| async {
                sleep(Duration::from_secs(3600)).await;
                Ok::<_, TransportError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RetryError::Cancelled { attempts: 1 }));
        assert!(err.is_interrupted());
    }

    #[tokio::test(start_paused = true)]
    async fn already_cancelled_sends_nothing() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let executor = RetryExecutor::new(policy(3)).with_cancel(cancel);
        let calls = AtomicU32::new(0);
        let err = executor
            .execute(&mut BodyReplay::empty(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, TransportError>(()) }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(err, RetryError::Cancelled { attempts: 0 }));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_beats_exhaustion() {
        // backoff of 1s cannot fit in the 1.5s budget after the second attempt
        let executor = RetryExecutor::new(
            policy(5)
                .with_backoff(Backoff::new(Duration::from_secs(1), Duration::from_secs(1)))
                .with_total_timeout(Duration::from_millis(1500)),
        );
        let calls = AtomicU32::new(0);
        let err = executor
            .execute(&mut BodyReplay::empty(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(refused()) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(err, RetryError::DeadlineExceeded { attempts: 2, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn past_deadline_sends_nothing() {
        let executor = RetryExecutor::new(policy(3)).with_deadline(Instant::now());
        let calls = AtomicU32::new(0);
        let err = executor
            .execute(&mut BodyReplay::empty(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, TransportError>(()) }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(err, RetryError::DeadlineExceeded { attempts: 0, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_timeout_is_retried_under_timeouts_only() {
        let executor = RetryExecutor::new(
            policy(3)
                .with_retry_on(RetryPredicate::TimeoutsOnly)
                .with_attempt_timeout(Duration::from_millis(50)),
        );
        let calls = AtomicU32::new(0);
        let err = executor
            .execute(&mut BodyReplay::empty(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    sleep(Duration::from_secs(60)).await;
                    Ok::<_, TransportError>(())
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            RetryError::Exhausted { attempts, source } => {
                assert_eq!(attempts, 3);
                assert!(source.is_timeout());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_inside_attempt_is_not_a_timeout() {
        let executor = RetryExecutor::new(
            policy(3)
                .with_retry_on(RetryPredicate::TimeoutsOnly)
                .with_attempt_timeout(Duration::from_secs(10))
                .with_total_timeout(Duration::from_millis(200)),
        );
        let calls = AtomicU32::new(0);
        let err = executor
            .execute(&mut BodyReplay::empty(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    sleep(Duration::from_secs(60)).await;
                    Ok::<_, TransportError>(())
                }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, RetryError::DeadlineExceeded { attempts: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn body_error_surfaces_before_send() {
        struct Broken;
        impl std::io::Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"))
            }
        }

        let executor = RetryExecutor::new(policy(3));
        let mut body = BodyReplay::from_reader(Broken);
        let calls = AtomicU32::new(0);
        let err = executor
            .execute(&mut body, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, TransportError>(()) }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(err, RetryError::Body { attempts: 0, .. }));
        assert!(err.to_string().contains("disk gone"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancel_interrupts_slow_body_read() {
        struct Trickle(u8);
        impl std::io::Read for Trickle {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                if self.0 == 0 || buf.is_empty() {
                    return Ok(0);
                }
                std::thread::sleep(std::time::Duration::from_millis(500));
                self.0 -= 1;
                buf[0] = b'x';
                Ok(1)
            }
        }

        let cancel = CancelToken::new();
        let executor = RetryExecutor::new(policy(3)).with_cancel(cancel.clone());
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let mut body = BodyReplay::from_reader(Trickle(4));
        let calls = AtomicU32::new(0);
        let err = executor
            .execute(&mut body, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, TransportError>(()) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, RetryError::Cancelled { attempts: 0 }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(started.elapsed() < std::time::Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_during_backoff_keeps_last_error() {
        let executor = RetryExecutor::new(
            policy(5)
                .with_backoff(Backoff::new(Duration::from_secs(1), Duration::from_secs(1)))
                .with_total_timeout(Duration::from_millis(500)),
        );
        let err = executor
            .execute(&mut BodyReplay::empty(), |_| async {
                Err::<(), _>(refused())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, RetryError::DeadlineExceeded { attempts: 1, .. }));
        assert!(matches!(err.last_error(), Some(TransportError::Connection(_))));
        assert!(std::error::Error::source(&err).is_some());
    }
}
