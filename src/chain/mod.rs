//! Assertion chain subsystem.
//!
//! # Data Flow
//! ```text
//! Expect::request()                 root Chain
//!     → RequestBuilder::expect()    enter("expect()") ... leave()
//!     → Response::json()            clone → JsonValue branch
//!     → JsonValue::field("id")      clone → JsonValue branch
//!     → is_equal(..)                enter/leave, fail() on mismatch
//!
//! Chain::fail() / Chain::leave()
//!     → handler.rs (AssertionHandler: success / failure)
//!     → DefaultHandler: Formatter → Reporter (panic or log)
//! ```
//!
//! # Design Decisions
//! - Each fluent value owns its chain; deriving a value clones the chain
//! - Assertions on a failed branch are silent no-ops that still return a
//!   usable value
//! - Severity is a branch property, stamped onto each failure

pub mod branch;
pub mod context;
pub mod failure;
pub mod handler;

pub use branch::{Chain, FailCallback};
pub use context::{AssertionContext, RequestInfo, ResponseInfo};
pub use failure::{AssertionKind, Cause, Failure, Message, Severity};
pub use handler::{
    AssertionHandler, DefaultFormatter, DefaultHandler, Event, Formatter, LogReporter,
    PanicReporter, RecordingHandler, Reporter,
};
