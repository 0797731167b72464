use std::{collections::HashSet, net::SocketAddr};

use crate::config::models::{RouterConfig, SubrouterConfig, TimeoutConfig, TlsConfig};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Invalid TLS configuration: {message}")]
    InvalidTls { message: String },

    #[error("Duplicate host '{url}' at position {position}")]
    DuplicateHost { url: String, position: usize },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Router configuration validator
pub struct RouterConfigValidator;

impl RouterConfigValidator {
    /// Validate the entire router configuration, reporting every problem at once
    pub fn validate(config: &RouterConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if let Err(mut host_errors) = Self::validate_hosts(&config.hosts) {
            errors.append(&mut host_errors);
        }

        if let Err(mut timeout_errors) = Self::validate_timeouts(&config.timeouts) {
            errors.append(&mut timeout_errors);
        }

        if let Err(mut subrouter_errors) = Self::validate_subrouter(&config.subrouter) {
            errors.append(&mut subrouter_errors);
        }

        if config.max_body_bytes == 0 {
            errors.push(ValidationError::InvalidField {
                field: "max_body_bytes".to_string(),
                message: "Must be greater than zero".to_string(),
            });
        }

        if let Some(tls_config) = &config.tls
            && let Err(e) = Self::validate_tls_config(tls_config)
        {
            errors.push(e);
        }

        if let Err(e) = tracing_subscriber::EnvFilter::try_new(&config.logging.level) {
            errors.push(ValidationError::InvalidField {
                field: "logging.level".to_string(),
                message: e.to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// Host list must be non-empty, well-formed and free of duplicates
    fn validate_hosts(hosts: &[String]) -> Result<(), Vec<ValidationError>> {
        if hosts.is_empty() {
            return Err(vec![ValidationError::MissingField {
                field: "hosts".to_string(),
            }]);
        }

        let mut errors = Vec::new();
        let mut seen = HashSet::new();
        for (position, host) in hosts.iter().enumerate() {
            if let Err(e) = Self::validate_url(host, &format!("hosts[{position}]")) {
                errors.push(e);
                continue;
            }
            if !seen.insert(host.trim_end_matches('/')) {
                errors.push(ValidationError::DuplicateHost {
                    url: host.clone(),
                    position,
                });
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    fn validate_timeouts(timeouts: &TimeoutConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        for (field, value, parsed) in [
            ("timeouts.attempt", &timeouts.attempt, timeouts.attempt_duration()),
            ("timeouts.registry", &timeouts.registry, timeouts.registry_duration()),
        ] {
            match parsed {
                Ok(d) if d.is_zero() => errors.push(ValidationError::InvalidField {
                    field: field.to_string(),
                    message: "Timeout must be greater than zero".to_string(),
                }),
                Ok(_) => {}
                Err(e) => errors.push(ValidationError::InvalidField {
                    field: field.to_string(),
                    message: format!("Invalid duration '{value}': {e}"),
                }),
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// URLs that are present must be valid; a partial section is allowed and simply disables
    /// the override (the server logs a warning for it).
    fn validate_subrouter(config: &SubrouterConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Some(url) = &config.url
            && let Err(e) = Self::validate_url(url, "subrouter.url")
        {
            errors.push(e);
        }
        if let Some(url) = &config.registry_url
            && let Err(e) = Self::validate_url(url, "subrouter.registry_url")
        {
            errors.push(e);
        }

        match config.cache_ttl_duration() {
            Ok(d) if d.is_zero() => errors.push(ValidationError::InvalidField {
                field: "subrouter.cache_ttl".to_string(),
                message: "Cache TTL must be greater than zero".to_string(),
            }),
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::InvalidField {
                field: "subrouter.cache_ttl".to_string(),
                message: format!("Invalid duration '{}': {e}", config.cache_ttl),
            }),
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Validate URL format
    fn validate_url(url_str: &str, context: &str) -> ValidationResult<()> {
        match url::Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: format!(
                            "URL scheme must be 'http' or 'https', got '{}'",
                            url.scheme()
                        ),
                    });
                }

                if url.host().is_none() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "URL must have a valid host".to_string(),
                    });
                }

                if url.query().is_some() || url.fragment().is_some() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "URL must not carry a query or fragment".to_string(),
                    });
                }

                Ok(())
            }
            Err(e) => Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("Invalid URL format: {e}"),
            }),
        }
    }

    fn validate_tls_config(config: &TlsConfig) -> ValidationResult<()> {
        if !std::path::Path::new(&config.cert_path).exists() {
            return Err(ValidationError::InvalidTls {
                message: format!("Certificate file does not exist: {}", config.cert_path),
            });
        }

        if !std::path::Path::new(&config.key_path).exists() {
            return Err(ValidationError::InvalidTls {
                message: format!("Private key file does not exist: {}", config.key_path),
            });
        }

        Ok(())
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
