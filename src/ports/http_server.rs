use thiserror::Error;

/// Client-facing error classes produced by the HTTP handler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HandlerError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),
    #[error("Bad gateway: {0}")]
    BadGateway(String),
    #[error("Gateway timeout: {0}")]
    GatewayTimeout(String),
    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl HandlerError {
    /// HTTP status used when this error is returned to the client.
    pub fn status_code(&self) -> http::StatusCode {
        match self {
            HandlerError::BadRequest(_) => http::StatusCode::BAD_REQUEST,
            HandlerError::PayloadTooLarge(_) => http::StatusCode::PAYLOAD_TOO_LARGE,
            HandlerError::BadGateway(_) => http::StatusCode::BAD_GATEWAY,
            HandlerError::GatewayTimeout(_) => http::StatusCode::GATEWAY_TIMEOUT,
            HandlerError::InternalError(_) => http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
