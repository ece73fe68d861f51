//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! RequestBuilder::expect()
//!     → executor.rs (attempt loop)
//!         → body (BodyReplay: snapshot first, rewind on retries)
//!         → timeouts.rs (race send against attempt timer, deadline, cancel)
//!         → retries.rs (classify failure with the retry predicate)
//!         → backoff.rs (delay before next attempt, raced against cancel)
//!     → one outcome: response or RetryError
//! ```
//!
//! # Design Decisions
//! - At least one attempt, at most `max_attempts`
//! - No attempt starts after cancellation or past the deadline
//! - An in-flight attempt is dropped when cancel/deadline wins the race
//! - Backoff sleeps are cancellable

pub mod backoff;
pub mod executor;
pub mod retries;
pub mod timeouts;

pub use backoff::{Backoff, Growth};
pub use executor::{Attempt, Executed, RetryError, RetryExecutor};
pub use retries::{RetryFn, RetryPolicy, RetryPredicate};
pub use timeouts::{race, CancelToken, Race};
