use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// Initialize tracing from the `[logging]` section.
///
/// `RUST_LOG`, when set, takes precedence over the configured level.
pub fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let level = std::env::var("RUST_LOG").unwrap_or_else(|_| logging.level.clone());
    init_tracing_with_config(&level, logging.json, logging.include_spans)
}

/// Initialize tracing with custom configuration
pub fn init_tracing_with_config(level: &str, json_format: bool, include_spans: bool) -> Result<()> {
    let env_filter =
        EnvFilter::try_new(level).wrap_err_with(|| format!("Invalid log level: {level}"))?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let result = if json_format {
        Registry::default()
            .with(env_filter)
            .with(
                fmt_layer
                    .json()
                    .with_current_span(include_spans)
                    .with_span_list(include_spans),
            )
            .try_init()
    } else {
        Registry::default()
            .with(env_filter)
            .with(fmt_layer.pretty().with_ansi(true))
            .try_init()
    };
    result.wrap_err("A global tracing subscriber is already installed")?;

    tracing::info!(
        "Router logging initialized with level: {}, json: {}, spans: {}",
        level,
        json_format,
        include_spans
    );
    Ok(())
}

/// Shutdown tracing gracefully
pub fn shutdown_tracing() {
    // tracing-subscriber has no explicit shutdown; stdout is line-buffered
    tracing::info!("Router tracing shutdown complete");
}

/// Create a request-scoped tracing span
pub fn create_request_span(method: &str, path: &str, request_id: &str) -> tracing::Span {
    tracing::info_span!(
        "request",
        http.method = method,
        http.path = path,
        request.id = request_id,
        process.id = tracing::field::Empty,
        route = tracing::field::Empty,
        http.status_code = tracing::field::Empty,
        duration_ms = tracing::field::Empty,
    )
}

/// Create a span for one host attempt inside a failover pass
pub fn create_attempt_span(host_url: &str, method: &str, path: &str, position: usize) -> tracing::Span {
    tracing::info_span!(
        "host_attempt",
        host.url = host_url,
        attempt.position = position,
        http.method = method,
        http.path = path,
        http.status_code = tracing::field::Empty,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_with_config() {
        // A second init in the same test binary must report an error rather than panic.
        assert!(init_tracing_with_config("debug", true, true).is_ok());
        assert!(init_tracing_with_config("debug", false, false).is_err());
    }

    #[test]
    fn test_create_request_span() {
        let span = create_request_span("GET", "/state/abc", "req-123");
        // Metadata is only present when a subscriber is interested in the span.
        if let Some(metadata) = span.metadata() {
            assert_eq!(metadata.name(), "request");
        }
    }

    #[test]
    fn test_create_attempt_span() {
        let span = create_attempt_span("http://host", "POST", "/", 2);
        if let Some(metadata) = span.metadata() {
            assert_eq!(metadata.name(), "host_attempt");
        }
    }
}
