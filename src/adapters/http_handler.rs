use std::{net::SocketAddr, sync::Arc, time::Instant};

use axum::{
    body::Body as AxumBody,
    http::{HeaderMap, HeaderValue, StatusCode, header},
};
use eyre::{Result, WrapErr};
use hyper::{Request, Response};
use tracing::Instrument;

use crate::{
    adapters::middleware::REQUEST_ID_HEADER, core::RequestDispatcher,
    ports::http_server::HandlerError, tracing_setup,
};

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_FORWARDED_HOST: &str = "x-forwarded-host";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// HTTP handler for the unit router
#[derive(Clone)]
pub struct HttpHandler {
    dispatcher: Arc<RequestDispatcher>,
    /// Whether the listener terminates TLS; reported as `X-Forwarded-Proto`
    secure: bool,
}

impl HttpHandler {
    pub fn new(dispatcher: Arc<RequestDispatcher>, secure: bool) -> Self {
        Self { dispatcher, secure }
    }

    /// Main request handler: `/health` is answered locally, everything else is routed.
    pub async fn handle_request(
        &self,
        req: Request<AxumBody>,
        client_addr: Option<SocketAddr>,
    ) -> Result<Response<AxumBody>, eyre::Error> {
        match req.uri().path() {
            "/health" => self.handle_health_check().await,
            _ => self.handle_routed_request(req, client_addr).await,
        }
    }

    /// Handle health check endpoint
    async fn handle_health_check(&self) -> Result<Response<AxumBody>, eyre::Error> {
        let health_data = serde_json::json!({
            "status": "healthy",
            "unit": self.dispatcher.unit().to_string(),
            "strategy": self.dispatcher.strategy().to_string(),
            "hosts": self.dispatcher.pool().len(),
            "subrouter_enabled": self.dispatcher.subrouter_enabled(),
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": chrono::Utc::now().to_rfc3339()
        });

        let response = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json")
            .body(AxumBody::from(health_data.to_string()))
            .wrap_err("Failed to build health check response")?;

        Ok(response)
    }

    async fn handle_routed_request(
        &self,
        mut req: Request<AxumBody>,
        client_addr: Option<SocketAddr>,
    ) -> Result<Response<AxumBody>, eyre::Error> {
        let request_id = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let span = tracing_setup::create_request_span(
            req.method().as_str(),
            req.uri().path(),
            &request_id,
        );

        async move {
            let started = Instant::now();
            Self::add_forwarded_headers(req.headers_mut(), client_addr, self.secure);

            let response = match self.dispatcher.dispatch(req).await {
                Ok(response) => response,
                Err(e) => Self::error_response(&HandlerError::from(e))?,
            };

            let span = tracing::Span::current();
            span.record("http.status_code", response.status().as_u16());
            span.record("duration_ms", started.elapsed().as_millis() as u64);
            Ok::<_, eyre::Error>(response)
        }
        .instrument(span)
        .await
    }

    /// Append the client to `X-Forwarded-For` and fill in host and protocol if
    /// no upstream proxy did.
    fn add_forwarded_headers(headers: &mut HeaderMap, client_addr: Option<SocketAddr>, secure: bool) {
        if let Some(addr) = client_addr {
            let client_ip = addr.ip().to_string();
            let forwarded_for = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
                Some(existing) if !existing.trim().is_empty() => {
                    format!("{}, {client_ip}", existing.trim())
                }
                _ => client_ip,
            };
            if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
                headers.insert(X_FORWARDED_FOR, value);
            }
        }

        if !headers.contains_key(X_FORWARDED_HOST)
            && let Some(host) = headers.get(header::HOST).cloned()
        {
            headers.insert(X_FORWARDED_HOST, host);
        }

        if !headers.contains_key(X_FORWARDED_PROTO) {
            let proto = if secure { "https" } else { "http" };
            headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static(proto));
        }
    }

    fn error_response(error: &HandlerError) -> Result<Response<AxumBody>, eyre::Error> {
        let status = error.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %error, "request failed");
        } else {
            tracing::info!(status = status.as_u16(), error = %error, "request rejected");
        }

        Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(AxumBody::from(error.to_string()))
            .wrap_err("Failed to build error response")
    }
}
