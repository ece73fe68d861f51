//! HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! Expect::get("/users")
//!     → request.rs (RequestBuilder: URL, query, headers, body, policy)
//!     → RequestBuilder::expect()
//!         → resilience::RetryExecutor (attempts, backoff, deadline, cancel)
//!             → transport.rs (Transport::send, one attempt each)
//!     → response.rs (fluent Response on a clone of the request chain)
//! ```
//!
//! # Design Decisions
//! - The transport is a trait object so tests can script replies
//! - Responses are fully buffered before assertions run

pub mod request;
pub mod response;
pub mod transport;

pub use request::{Expect, RequestBuilder, REQUEST_ID_HEADER};
pub use response::{Response, StatusRange};
pub use transport::{
    HttpRequest, HttpResponse, ReqwestTransport, SendFuture, Transport, TransportError,
};
