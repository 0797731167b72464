//! Sequential failover over a candidate sequence.
//!
//! Proxy mode walks the sequence in order and stops at the first host that
//! answers at all; only transport failures move on to the next host. Redirect
//! mode never contacts a host and points the client at the primary candidate.
use std::{sync::Arc, time::Duration};

use axum::body::Body as AxumBody;
use bytes::Bytes;
use hyper::{HeaderMap, Method, Request, Response, StatusCode, header};
use thiserror::Error;
use tracing::Instrument;

use crate::{
    config::DispatchStrategy,
    core::{host::Host, selector::CandidateSequence},
    metrics,
    ports::http_client::{HttpClient, HttpClientError, HttpClientResult},
    tracing_setup,
};

/// Connection-scoped headers that must not be forwarded.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// An inbound request with its body fully buffered, so it can be replayed
/// against several hosts.
#[derive(Debug, Clone)]
pub struct BufferedRequest {
    method: Method,
    path_and_query: String,
    headers: HeaderMap,
    body: Bytes,
}

impl BufferedRequest {
    pub fn new(
        method: Method,
        path_and_query: impl Into<String>,
        headers: HeaderMap,
        body: Bytes,
    ) -> Self {
        let mut headers = headers;
        headers.remove(header::HOST);
        for name in HOP_BY_HOP_HEADERS {
            headers.remove(*name);
        }
        Self {
            method,
            path_and_query: path_and_query.into(),
            headers,
            body,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path_and_query(&self) -> &str {
        &self.path_and_query
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Build the outgoing request addressed at `host`.
    pub fn to_request(&self, host: &Host) -> HttpClientResult<Request<AxumBody>> {
        let uri = host.url().join(&self.path_and_query);
        let mut builder = Request::builder().method(self.method.clone()).uri(uri);
        if let Some(headers) = builder.headers_mut() {
            headers.extend(self.headers.clone());
        }
        builder
            .body(AxumBody::from(self.body.clone()))
            .map_err(|e| HttpClientError::InvalidRequest(e.to_string()))
    }
}

/// Successful terminal result of an execution.
#[derive(Debug)]
pub struct Dispatched {
    pub response: Response<AxumBody>,
    /// Host that answered (proxy) or that the client was sent to (redirect)
    pub host: Host,
    /// Hosts contacted; always 0 in redirect mode
    pub attempts: usize,
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FailoverError {
    /// Every candidate failed at the transport level; carries the last failure only.
    #[error("all {attempts} candidate host(s) unreachable; last failure from {host}: {last_error}")]
    Exhausted {
        host: Host,
        attempts: usize,
        #[source]
        last_error: HttpClientError,
    },

    #[error("candidate sequence is empty")]
    EmptySequence,

    #[error("failed to build redirect response: {0}")]
    Redirect(String),
}

impl FailoverError {
    /// True when the final failure was a per-attempt timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, FailoverError::Exhausted { last_error, .. } if last_error.is_timeout())
    }

    /// Host tried last, if any host was tried.
    pub fn last_host(&self) -> Option<&Host> {
        match self {
            FailoverError::Exhausted { host, .. } => Some(host),
            _ => None,
        }
    }
}

/// Walks a candidate sequence with the configured strategy.
pub struct FailoverExecutor {
    client: Arc<dyn HttpClient>,
    attempt_timeout: Duration,
}

impl FailoverExecutor {
    pub fn new(client: Arc<dyn HttpClient>, attempt_timeout: Duration) -> Self {
        Self {
            client,
            attempt_timeout,
        }
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    pub async fn execute(
        &self,
        sequence: &CandidateSequence,
        strategy: DispatchStrategy,
        request: &BufferedRequest,
    ) -> Result<Dispatched, FailoverError> {
        match strategy {
            DispatchStrategy::Redirect => Self::redirect(sequence, request),
            DispatchStrategy::Proxy => self.proxy(sequence, request).await,
        }
    }

    /// 307 to the primary candidate. The client owns any retry.
    fn redirect(
        sequence: &CandidateSequence,
        request: &BufferedRequest,
    ) -> Result<Dispatched, FailoverError> {
        let host = sequence.primary().ok_or(FailoverError::EmptySequence)?;
        let location = host.url().join(request.path_and_query());
        tracing::debug!(host = %host, location = %location, "redirecting to primary host");

        let response = Response::builder()
            .status(StatusCode::TEMPORARY_REDIRECT)
            .header(header::LOCATION, location)
            .body(AxumBody::empty())
            .map_err(|e| FailoverError::Redirect(e.to_string()))?;

        Ok(Dispatched {
            response,
            host: host.clone(),
            attempts: 0,
        })
    }

    /// One pass over the sequence; the first reached host wins.
    async fn proxy(
        &self,
        sequence: &CandidateSequence,
        request: &BufferedRequest,
    ) -> Result<Dispatched, FailoverError> {
        let mut last_failure: Option<(Host, HttpClientError)> = None;

        for (position, host) in sequence.iter().enumerate() {
            let span = tracing_setup::create_attempt_span(
                host.url().as_str(),
                request.method().as_str(),
                request.path_and_query(),
                position,
            );

            match self.attempt(host, request).instrument(span).await {
                Ok(response) => {
                    metrics::increment_attempt(true);
                    tracing::debug!(
                        host = %host,
                        status = response.status().as_u16(),
                        attempt = position + 1,
                        "host reached"
                    );
                    return Ok(Dispatched {
                        response,
                        host: host.clone(),
                        attempts: position + 1,
                    });
                }
                Err(e) => {
                    metrics::increment_attempt(false);
                    tracing::warn!(
                        host = %host,
                        attempt = position + 1,
                        remaining = sequence.len() - position - 1,
                        error = %e,
                        "host unreachable"
                    );
                    last_failure = Some((host.clone(), e));
                }
            }
        }

        match last_failure {
            Some((host, last_error)) => Err(FailoverError::Exhausted {
                host,
                attempts: sequence.len(),
                last_error,
            }),
            None => Err(FailoverError::EmptySequence),
        }
    }

    async fn attempt(
        &self,
        host: &Host,
        request: &BufferedRequest,
    ) -> HttpClientResult<Response<AxumBody>> {
        let outgoing = request.to_request(host)?;
        match tokio::time::timeout(self.attempt_timeout, self.client.send_request(outgoing)).await
        {
            Ok(result) => result,
            Err(_) => Err(HttpClientError::Timeout(self.attempt_timeout)),
        }
    }
}
