use std::{fmt, str::FromStr};

use thiserror::Error;

/// Errors raised while building hosts and the host pool
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HostError {
    /// Error when URL is invalid
    #[error("Invalid host URL: {0}")]
    InvalidUrl(String),

    /// The pool must contain at least one host
    #[error("Host pool must contain at least one host")]
    EmptyPool,

    /// The same base URL was configured twice
    #[error("Duplicate host URL in pool: {0}")]
    DuplicateHost(String),
}

/// Result type for host operations
pub type HostResult<T> = Result<T, HostError>;

/// A type-safe representation of a host base URL
///
/// The stored form never ends with `/`, so `join` can append a request path
/// (which always starts with `/`) without doubling separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostUrl {
    /// The underlying URL as a string
    url: String,
    /// Whether the URL is secure (HTTPS)
    is_secure: bool,
}

impl HostUrl {
    /// Creates a new HostUrl if the provided string is a valid absolute http(s) URL
    ///
    /// # Arguments
    /// * `url` - The URL string to validate and wrap
    ///
    /// # Returns
    /// A result containing the HostUrl or an error
    pub fn new(url: &str) -> HostResult<Self> {
        let trimmed = url.trim().trim_end_matches('/');
        let is_secure = trimmed.starts_with("https://");
        let is_http = trimmed.starts_with("http://");

        if !is_secure && !is_http {
            return Err(HostError::InvalidUrl(format!(
                "Host URL must start with http:// or https://, got: {url}"
            )));
        }

        let parsed = url::Url::parse(trimmed)
            .map_err(|e| HostError::InvalidUrl(format!("{url}: {e}")))?;
        if parsed.host_str().is_none_or(str::is_empty) {
            return Err(HostError::InvalidUrl(format!("{url}: missing host")));
        }
        if parsed.query().is_some() || parsed.fragment().is_some() {
            return Err(HostError::InvalidUrl(format!(
                "{url}: base URL must not carry a query or fragment"
            )));
        }

        Ok(HostUrl {
            url: trimmed.to_string(),
            is_secure,
        })
    }

    /// Get the underlying URL as a string reference
    pub fn as_str(&self) -> &str {
        &self.url
    }

    /// Check if the URL is using HTTPS
    pub fn is_secure(&self) -> bool {
        self.is_secure
    }

    /// Get the underlying URL as a string
    pub fn into_string(self) -> String {
        self.url
    }

    /// Append an origin-form path (and query) to this base URL.
    pub fn join(&self, path_and_query: &str) -> String {
        if path_and_query.is_empty() {
            return format!("{}/", self.url);
        }
        if path_and_query.starts_with('/') {
            format!("{}{}", self.url, path_and_query)
        } else {
            format!("{}/{}", self.url, path_and_query)
        }
    }
}

impl FromStr for HostUrl {
    type Err = HostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HostUrl::new(s)
    }
}

impl fmt::Display for HostUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// One backend host: its ordinal position in the configured pool and its base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    index: usize,
    url: HostUrl,
}

impl Host {
    pub fn new(index: usize, url: HostUrl) -> Self {
        Self { index, url }
    }

    /// Position of this host in the configured pool.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn url(&self) -> &HostUrl {
        &self.url
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Immutable, ordered pool of backend hosts.
///
/// The configured order is the only input to cross-instance routing
/// consistency: two gateways built from byte-identical host lists produce
/// identical candidate sequences for every process id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPool {
    hosts: Vec<Host>,
}

impl HostPool {
    /// Build a pool from configured base URLs, preserving their order.
    pub fn new<S: AsRef<str>>(urls: &[S]) -> HostResult<Self> {
        if urls.is_empty() {
            return Err(HostError::EmptyPool);
        }

        let mut hosts: Vec<Host> = Vec::with_capacity(urls.len());
        for (index, raw) in urls.iter().enumerate() {
            let url = HostUrl::new(raw.as_ref())?;
            if hosts.iter().any(|h| h.url == url) {
                return Err(HostError::DuplicateHost(url.into_string()));
            }
            hosts.push(Host::new(index, url));
        }

        Ok(Self { hosts })
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Always false for a constructed pool; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Host> {
        self.hosts.get(index)
    }

    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_url_valid() {
        let url = "http://example.com";
        let host_url = HostUrl::new(url).expect("Valid HTTP URL should parse");
        assert_eq!(host_url.as_str(), url);
        assert!(!host_url.is_secure());

        let secure_url = "https://secure.example.com";
        let secure_host_url = HostUrl::new(secure_url).expect("Valid HTTPS URL should parse");
        assert_eq!(secure_host_url.as_str(), secure_url);
        assert!(secure_host_url.is_secure());
    }

    #[test]
    fn test_host_url_invalid() {
        assert!(HostUrl::new("example.com").is_err());
        assert!(HostUrl::new("ftp://example.com").is_err());
        assert!(HostUrl::new("http://").is_err());
        assert!(HostUrl::new("http://example.com/?a=b").is_err());
    }

    #[test]
    fn test_host_url_strips_trailing_slash() {
        let host_url: HostUrl = "https://cu.example.com/".parse().unwrap();
        assert_eq!(host_url.as_str(), "https://cu.example.com");
        assert_eq!(
            host_url.join("/state/abc?x=1"),
            "https://cu.example.com/state/abc?x=1"
        );
    }

    #[test]
    fn test_host_url_join_keeps_base_path() {
        let host_url = HostUrl::new("http://gateway.local/cu").unwrap();
        assert_eq!(host_url.join("/result/1"), "http://gateway.local/cu/result/1");
        assert_eq!(host_url.join(""), "http://gateway.local/cu/");
    }

    #[test]
    fn test_pool_preserves_order_and_indices() {
        let pool = HostPool::new(&["http://a", "http://b", "http://c"]).unwrap();
        assert_eq!(pool.len(), 3);
        for (i, host) in pool.hosts().iter().enumerate() {
            assert_eq!(host.index(), i);
        }
        assert_eq!(pool.get(1).unwrap().url().as_str(), "http://b");
    }

    #[test]
    fn test_pool_rejects_empty_and_duplicates() {
        let empty: [&str; 0] = [];
        assert_eq!(HostPool::new(&empty), Err(HostError::EmptyPool));
        assert!(matches!(
            HostPool::new(&["http://a", "http://a/"]),
            Err(HostError::DuplicateHost(_))
        ));
    }
}
