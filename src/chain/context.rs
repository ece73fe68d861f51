//! Assertion context carried by every chain.
//!
//! # Responsibilities
//! - Name the test and the request an assertion belongs to
//! - Track the literal path (`request("GET", "/users").expect().json().field("id")`)
//!   and the aliased path shown to users
//! - Reference the request/response an assertion was made against
//!
//! # Design Decisions
//! - Context is copied on every chain clone; path vectors are never shared
//! - Request/response snapshots are immutable, so they sit behind `Arc`

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Immutable snapshot of the request an assertion refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    /// HTTP method (e.g., "GET").
    pub method: String,
    /// Fully resolved request URL.
    pub url: String,
    /// Value of the `x-request-id` header sent with every attempt.
    pub request_id: String,
}

/// Immutable snapshot of the response an assertion refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseInfo {
    /// HTTP status code.
    pub status: u16,
    /// Number of attempts it took to obtain this response.
    pub attempts: u32,
}

/// Where an assertion lives.
#[derive(Debug, Clone, Default)]
pub struct AssertionContext {
    /// Name of the enclosing test, if known.
    pub test_name: Option<String>,

    /// User-facing name of the request, if set.
    pub request_name: Option<String>,

    /// Literal path segments, outermost first.
    pub path: Vec<String>,

    /// Aliased path segments. Equal to `path` until an alias is set.
    pub alias_path: Vec<String>,

    /// Request under test.
    pub request: Option<Arc<RequestInfo>>,

    /// Response under test.
    pub response: Option<Arc<ResponseInfo>>,

    /// Round-trip time of the response under test.
    pub rtt: Option<Duration>,

    /// Literal depth each alias was set at, with the aliased path it replaced.
    aliases: Vec<(usize, Vec<String>)>,
}

impl AssertionContext {
    /// Create an empty context for the given test.
    pub fn new(test_name: Option<String>) -> Self {
        Self {
            test_name,
            ..Self::default()
        }
    }

    /// Literal path joined with `.`.
    pub fn path_string(&self) -> String {
        self.path.join(".")
    }

    /// Aliased path joined with `.`.
    pub fn alias_string(&self) -> String {
        self.alias_path.join(".")
    }

    pub(crate) fn push(&mut self, segment: &str) {
        self.path.push(segment.to_string());
        self.alias_path.push(segment.to_string());
    }

    /// Replace the aliased path with a single name until the current
    /// segment is left.
    pub(crate) fn set_alias(&mut self, alias: &str) {
        let replaced = std::mem::replace(&mut self.alias_path, vec![alias.to_string()]);
        self.aliases.push((self.path.len(), replaced));
    }

    pub(crate) fn pop(&mut self) {
        self.path.pop();
        self.alias_path.pop();

        let depth = self.path.len();
        while let Some((set_at, _)) = self.aliases.last() {
            if *set_at <= depth {
                break;
            }
            let set_at = *set_at;
            if let Some((_, mut replaced)) = self.aliases.pop() {
                replaced.truncate(replaced.len().saturating_sub(set_at - depth));
                self.alias_path = replaced;
            }
        }
    }
}

impl fmt::Display for AssertionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(test) = &self.test_name {
            write!(f, "[{}] ", test)?;
        }
        if let Some(name) = &self.request_name {
            write!(f, "{}: ", name)?;
        }
        write!(f, "{}", self.alias_string())
    }
}
