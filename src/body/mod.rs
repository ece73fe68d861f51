//! Request body subsystem.
//!
//! # Data Flow
//! ```text
//! caller-supplied UpstreamBody (forward-only, must be closed)
//!     → replay.rs (BodyReplay: mirror into buffer on first drain)
//!     → attempt 1 reads through to upstream
//!     → attempt N > 1 rewinds and reads from the buffer only
//! ```
//!
//! # Design Decisions
//! - Upstream close and the release hook fire at most once, whatever the
//!   sequence of read/rewind/close calls
//! - Upstream errors are sticky: cached once, returned by every later call
//! - No internal locking; one logical request is sent by one flow

pub mod replay;
pub mod source;

pub use replay::{BodyError, BodyReplay, ReleaseHook};
pub use source::{ReaderBody, UpstreamBody};
