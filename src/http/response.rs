//! Fluent response assertions.
//!
//! # Responsibilities
//! - Hold the buffered response of one logical request together with its
//!   chain, round-trip time and attempt count
//! - Derive string, JSON and number values for headers, body and timing
//!
//! # Design Decisions
//! - A request that produced no response yields a `Response` whose chain has
//!   already failed; every assertion on it is a silent no-op
//! - Body decoding errors are assertion failures, not panics

use std::fmt;
use std::time::Duration;

use serde_json::Value;

use crate::chain::{AssertionKind, Chain, Failure};
use crate::http::transport::HttpResponse;
use crate::values::{JsonValue, NumberValue, StringValue};

/// Status classes accepted by [`Response::status_range`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusRange {
    Informational,
    Success,
    Redirect,
    ClientError,
    ServerError,
}

impl StatusRange {
    pub fn contains(&self, status: u16) -> bool {
        let class = match self {
            StatusRange::Informational => 1,
            StatusRange::Success => 2,
            StatusRange::Redirect => 3,
            StatusRange::ClientError => 4,
            StatusRange::ServerError => 5,
        };
        status / 100 == class
    }
}

impl fmt::Display for StatusRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusRange::Informational => "1xx",
            StatusRange::Success => "2xx",
            StatusRange::Redirect => "3xx",
            StatusRange::ClientError => "4xx",
            StatusRange::ServerError => "5xx",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub struct Response {
    chain: Chain,
    response: Option<HttpResponse>,
    rtt: Duration,
    attempts: u32,
}

impl Response {
    pub fn new(chain: Chain, response: HttpResponse, rtt: Duration, attempts: u32) -> Self {
        Self {
            chain,
            response: Some(response),
            rtt,
            attempts,
        }
    }

    /// Response for a request that never produced one. `chain` is expected
    /// to have failed already.
    pub fn failed(chain: Chain, attempts: u32) -> Self {
        Self {
            chain,
            response: None,
            rtt: Duration::ZERO,
            attempts,
        }
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn is_failed(&self) -> bool {
        self.chain.failed()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn raw(&self) -> Option<&HttpResponse> {
        self.response.as_ref()
    }

    pub fn alias(&mut self, name: &str) -> &mut Self {
        self.chain.set_alias(name);
        self
    }

    pub fn status(&mut self, expected: u16) -> &mut Self {
        let response = self.response.as_ref();
        self.chain.scoped("status()", |chain| {
            let Some(response) = present(chain, response) else {
                return;
            };
            if response.status != expected {
                chain.fail(
                    Failure::message(AssertionKind::IsEqual, "unexpected status code")
                        .with_actual(response.status)
                        .with_expected(expected),
                );
            }
        });
        self
    }

    pub fn status_range(&mut self, range: StatusRange) -> &mut Self {
        let response = self.response.as_ref();
        self.chain.scoped("status_range()", |chain| {
            let Some(response) = present(chain, response) else {
                return;
            };
            if !range.contains(response.status) {
                chain.fail(
                    Failure::message(AssertionKind::InRange, "status code outside of range")
                        .with_actual(response.status)
                        .with_expected(range.to_string()),
                );
            }
        });
        self
    }

    pub fn has_header(&mut self, name: &str) -> &mut Self {
        let response = self.response.as_ref();
        self.chain.scoped("has_header()", |chain| {
            let Some(response) = present(chain, response) else {
                return;
            };
            if response.header(name).is_none() {
                chain.fail(
                    Failure::message(AssertionKind::ContainsKey, "expected header to be present")
                        .with_reference(name),
                );
            }
        });
        self
    }

    /// Value of a header. Fails if the header is absent.
    pub fn header(&mut self, name: &str) -> StringValue {
        let segment = format!("header({name:?})");
        let response = self.response.as_ref();
        let value = self.chain.scoped(&segment, |chain| {
            let response = present(chain, response)?;
            match response.header(name) {
                Some(value) => Some(value.to_string()),
                None => {
                    chain.fail(
                        Failure::message(AssertionKind::ContainsKey, "expected header to be present")
                            .with_reference(name),
                    );
                    None
                }
            }
        });
        StringValue::new(self.chain.derive(&segment), value.unwrap_or_default())
    }

    /// Body decoded as UTF-8.
    pub fn text(&mut self) -> StringValue {
        let response = self.response.as_ref();
        let text = self.chain.scoped("text()", |chain| {
            let response = present(chain, response)?;
            match String::from_utf8(response.body.clone()) {
                Ok(text) => Some(text),
                Err(err) => {
                    chain.fail(Failure::new(AssertionKind::Valid, err));
                    None
                }
            }
        });
        StringValue::new(self.chain.derive("text()"), text.unwrap_or_default())
    }

    /// Body decoded as JSON.
    pub fn json(&mut self) -> JsonValue {
        let response = self.response.as_ref();
        let value = self.chain.scoped("json()", |chain| {
            let response = present(chain, response)?;
            match serde_json::from_slice::<Value>(&response.body) {
                Ok(value) => Some(value),
                Err(err) => {
                    chain.fail(
                        Failure::new(AssertionKind::Valid, err)
                            .with_actual(String::from_utf8_lossy(&response.body).into_owned()),
                    );
                    None
                }
            }
        });
        JsonValue::new(self.chain.derive("json()"), value.unwrap_or(Value::Null))
    }

    /// Round-trip time of the successful attempt sequence, in milliseconds.
    pub fn rtt(&mut self) -> NumberValue {
        let millis = self.rtt.as_secs_f64() * 1000.0;
        NumberValue::new(self.chain.derive("rtt()"), millis)
    }
}

/// The response if the branch is still healthy.
fn present<'a>(chain: &mut Chain, response: Option<&'a HttpResponse>) -> Option<&'a HttpResponse> {
    if chain.failed() {
        return None;
    }
    if response.is_none() {
        chain.fail(Failure::message(
            AssertionKind::Usage,
            "no response available for assertion",
        ));
    }
    response
}
