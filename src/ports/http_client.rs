use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{Request, Response};
use thiserror::Error;

/// Transport-level failures reaching a host.
///
/// There is deliberately no variant for HTTP error statuses: a host that
/// answers, whatever the status, has been reached.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpClientError {
    /// Error when connection to the host fails (refused, DNS, TLS, reset)
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error when the host does not answer in time
    #[error("Timeout error after {}", humantime::format_duration(*.0))]
    Timeout(Duration),

    /// Error when the outgoing request cannot be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl HttpClientError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, HttpClientError::Timeout(_))
    }
}

/// Result type alias for HTTP client operations
pub type HttpClientResult<T> = Result<T, HttpClientError>;

/// HttpClient defines the port (interface) for sending requests to hosts
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Send an HTTP request to a host
    ///
    /// # Arguments
    /// * `req` - The fully addressed request (absolute URI)
    ///
    /// # Returns
    /// The host's response, or a transport error if the host was not reached
    async fn send_request(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>>;
}
