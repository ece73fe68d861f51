//! Request building and execution.
//!
//! # Responsibilities
//! - Entry point (`Expect`) carrying transport, handler, defaults and policy
//! - Build one logical request: URL, query, headers, replayable body
//! - Run it through the retry executor and hand back a fluent `Response`
//!
//! # Design Decisions
//! - Request ID added once per logical request and reused by every attempt
//! - Builder misuse (bad URL, unserializable JSON) is a `Usage` failure on
//!   the request's chain, never a panic
//! - When retries on 5xx run out, the last 5xx is returned as a normal
//!   response so status assertions still apply

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::Serialize;
use tokio::time::Instant;
use url::Url;
use uuid::Uuid;

use crate::body::BodyReplay;
use crate::chain::{
    AssertionContext, AssertionHandler, AssertionKind, Chain, DefaultHandler, Failure, RequestInfo,
    ResponseInfo, Severity,
};
use crate::config::schema::AssertConfig;
use crate::http::response::Response;
use crate::http::transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError};
use crate::observability::metrics;
use crate::resilience::{
    Backoff, CancelToken, RetryError, RetryExecutor, RetryPolicy, RetryPredicate,
};

/// Header carrying the per-request identifier.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Entry point. Cheap to clone; every request gets its own root chain.
#[derive(Clone)]
pub struct Expect {
    base_url: Option<String>,
    default_headers: Vec<(String, String)>,
    transport: Arc<dyn Transport>,
    handler: Arc<dyn AssertionHandler>,
    severity: Severity,
    test_name: Option<String>,
    policy: RetryPolicy,
    cancel: Option<CancelToken>,
}

impl Expect {
    /// Defaults: panicking handler, fatal severity, single attempt.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            base_url: None,
            default_headers: Vec::new(),
            transport,
            handler: Arc::new(DefaultHandler::default()),
            severity: Severity::default(),
            test_name: None,
            policy: RetryPolicy::default(),
            cancel: None,
        }
    }

    /// Build from a loaded config using the `reqwest` transport.
    pub fn from_config(config: &AssertConfig) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::new(&config.client.user_agent)?;
        let mut expect = Self::new(Arc::new(transport))
            .with_policy(RetryPolicy::from_config(&config.retries, &config.timeouts))
            .with_severity(config.assertions.severity);
        expect.base_url = config.client.base_url.clone();
        expect.default_headers = config
            .client
            .default_headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        expect.test_name = config.assertions.test_name.clone();
        Ok(expect)
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn AssertionHandler>) -> Self {
        self.handler = handler;
        self
    }

    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub fn with_test_name(mut self, name: impl Into<String>) -> Self {
        self.test_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Token observed by every request created afterwards.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut context = AssertionContext::new(self.test_name.clone());
        context.push(&format!("request({:?}, {:?})", method.as_str(), path));
        let chain = Chain::new(context, Arc::clone(&self.handler)).with_severity(self.severity);

        RequestBuilder {
            chain,
            method,
            path: path.to_string(),
            base_url: self.base_url.clone(),
            headers: self.default_headers.clone(),
            query: Vec::new(),
            body: BodyReplay::empty(),
            transport: Arc::clone(&self.transport),
            policy: self.policy.clone(),
            cancel: self.cancel.clone(),
            deadline: None,
        }
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.request(Method::GET, path)
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.request(Method::POST, path)
    }

    pub fn put(&self, path: &str) -> RequestBuilder {
        self.request(Method::PUT, path)
    }

    pub fn patch(&self, path: &str) -> RequestBuilder {
        self.request(Method::PATCH, path)
    }

    pub fn delete(&self, path: &str) -> RequestBuilder {
        self.request(Method::DELETE, path)
    }

    pub fn head(&self, path: &str) -> RequestBuilder {
        self.request(Method::HEAD, path)
    }
}

/// One logical request under construction.
pub struct RequestBuilder {
    chain: Chain,
    method: Method,
    path: String,
    base_url: Option<String>,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    body: BodyReplay,
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    cancel: Option<CancelToken>,
    deadline: Option<Instant>,
}

impl RequestBuilder {
    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Name shown in failure reports.
    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        self.chain.set_request_name(name);
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    #[must_use]
    pub fn with_bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.body = BodyReplay::from_bytes(bytes);
        self
    }

    #[must_use]
    pub fn with_text(self, text: &str) -> Self {
        self.with_header("content-type", "text/plain; charset=utf-8")
            .with_bytes(text.as_bytes())
    }

    /// Serialize `value` as the body. A serialization error fails the
    /// request before anything is sent.
    #[must_use]
    pub fn with_json<T: Serialize>(mut self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(bytes) => self
                .with_header("content-type", "application/json")
                .with_bytes(bytes),
            Err(err) => {
                self.chain.scoped("with_json()", |chain| {
                    chain.fail(Failure::new(AssertionKind::Usage, err));
                });
                self
            }
        }
    }

    /// Use a prepared replayable body.
    #[must_use]
    pub fn with_body(mut self, body: BodyReplay) -> Self {
        self.body = body;
        self
    }

    /// Stream the body from `reader`; it is buffered on first use so every
    /// attempt sends identical bytes.
    #[must_use]
    pub fn with_reader<R>(self, reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        self.with_body(BodyReplay::from_reader(reader))
    }

    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.policy = self.policy.with_max_attempts(attempts);
        self
    }

    #[must_use]
    pub fn with_retry_on(mut self, predicate: RetryPredicate) -> Self {
        self.policy = self.policy.with_retry_on(predicate);
        self
    }

    /// Custom retry predicate.
    #[must_use]
    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&TransportError) -> bool + Send + Sync + 'static,
    {
        self.policy = self.policy.retry_if(predicate);
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.policy = self.policy.with_backoff(backoff);
        self
    }

    #[must_use]
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.policy = self.policy.with_attempt_timeout(timeout);
        self
    }

    /// Overall budget for all attempts and backoff delays.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.policy = self.policy.with_total_timeout(timeout);
        self
    }

    /// Absolute deadline; the earlier of this and `with_timeout` applies.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Fire `token` when this request, or any value derived from its
    /// response, records a failure.
    #[must_use]
    pub fn cancel_on_failure(mut self, token: CancelToken) -> Self {
        self.chain
            .set_fail_callback(Arc::new(move |_: &Failure| token.cancel()));
        self
    }

    /// Send the request and return its response.
    pub async fn expect(mut self) -> Response {
        self.chain.enter("expect()");
        let started = Instant::now();

        let response = match self.perform().await {
            Ok((response, attempts, rtt)) => {
                metrics::record_request("success", started.elapsed());
                self.chain.set_response(ResponseInfo {
                    status: response.status,
                    attempts,
                });
                self.chain.set_rtt(rtt);
                Response::new(self.chain.clone(), response, rtt, attempts)
            }
            Err((failure, attempts)) => {
                metrics::record_request("failure", started.elapsed());
                if let Some(failure) = failure {
                    self.chain.fail(failure);
                }
                Response::failed(self.chain.clone(), attempts)
            }
        };

        self.chain.leave();
        response
    }

    /// `Err((None, _))` means the chain had already failed.
    async fn perform(&mut self) -> Result<(HttpResponse, u32, Duration), (Option<Failure>, u32)> {
        if self.chain.failed() {
            return Err((None, 0));
        }
        let started = Instant::now();

        let url = self
            .resolve_url()
            .map_err(|err| (Some(Failure::new(AssertionKind::Usage, err)), 0))?;

        let request_id = Uuid::new_v4().to_string();
        self.chain.set_request(RequestInfo {
            method: self.method.to_string(),
            url: url.to_string(),
            request_id: request_id.clone(),
        });
        let mut headers = self.headers.clone();
        headers.push((REQUEST_ID_HEADER.to_string(), request_id.clone()));

        let mut executor = RetryExecutor::new(self.policy.clone());
        if let Some(cancel) = &self.cancel {
            executor = executor.with_cancel(cancel.clone());
        }
        if let Some(deadline) = self.deadline {
            executor = executor.with_deadline(deadline);
        }

        let surface_5xx = self.policy.retries_server_errors();
        let transport = Arc::clone(&self.transport);
        let method = self.method.clone();

        tracing::debug!(
            request_id = %request_id,
            method = %method,
            url = %url,
            "Executing request"
        );

        let outcome = executor
            .execute(&mut self.body, |attempt| {
                let transport = Arc::clone(&transport);
                let request = HttpRequest {
                    method: method.clone(),
                    url: url.clone(),
                    headers: headers.clone(),
                    body: attempt.body,
                };
                async move {
                    let response = transport.send(request).await?;
                    if surface_5xx && response.is_server_error() {
                        return Err(TransportError::ServerStatus(Box::new(response)));
                    }
                    Ok(response)
                }
            })
            .await;

        if let Err(err) = self.body.close() {
            tracing::debug!(request_id = %request_id, error = %err, "Request body close failed");
        }

        match outcome {
            Ok(done) => Ok((done.value, done.attempts, done.elapsed)),
            Err(RetryError::Exhausted {
                attempts,
                source: TransportError::ServerStatus(response),
            }) => {
                tracing::info!(
                    request_id = %request_id,
                    attempts,
                    status = response.status,
                    "Retries exhausted on server error, returning last response"
                );
                Ok((*response, attempts, started.elapsed()))
            }
            Err(RetryError::DeadlineExceeded {
                attempts,
                last: Some(TransportError::ServerStatus(response)),
            }) => {
                tracing::info!(
                    request_id = %request_id,
                    attempts,
                    status = response.status,
                    "Deadline reached after server error, returning last response"
                );
                Ok((*response, attempts, started.elapsed()))
            }
            Err(err) => {
                let attempts = err.attempts();
                Err((Some(Failure::new(AssertionKind::Operation, err)), attempts))
            }
        }
    }

    fn resolve_url(&self) -> Result<Url, url::ParseError> {
        let mut url = match Url::parse(&self.path) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = self.base_url.as_deref().unwrap_or_default();
                let joined = if self.path.is_empty() {
                    base.to_string()
                } else {
                    format!(
                        "{}/{}",
                        base.trim_end_matches('/'),
                        self.path.trim_start_matches('/')
                    )
                };
                Url::parse(&joined)?
            }
            Err(err) => return Err(err),
        };
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }
        Ok(url)
    }
}
