//! Configuration data structures for the router.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files. They are
//! serde-friendly and include defaults so that minimal configs stay short: a listen
//! address, a host list and a unit type are enough.
use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

/// Which kind of unit sits behind the pool; decides how process ids are found.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Compute,
    Messenger,
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitKind::Compute => write!(f, "compute"),
            UnitKind::Messenger => write!(f, "messenger"),
        }
    }
}

/// How a selected host is handed to the client.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStrategy {
    /// Forward the request and fail over between hosts
    #[default]
    Proxy,
    /// Answer 307 pointing at the primary host; no failover
    Redirect,
}

impl std::fmt::Display for DispatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchStrategy::Proxy => write!(f, "proxy"),
            DispatchStrategy::Redirect => write!(f, "redirect"),
        }
    }
}

/// Timeouts as humantime strings ("5s", "250ms", "1m").
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Per host attempt (connect + response headers)
    pub attempt: String,
    /// Owner registry lookup
    pub registry: String,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            attempt: "5s".to_string(),
            registry: "2s".to_string(),
        }
    }
}

impl TimeoutConfig {
    pub fn attempt_duration(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.attempt)
    }

    pub fn registry_duration(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.registry)
    }
}

/// Owner-based subrouter override.
///
/// Enabled only when `url`, `registry_url` and a non-empty `owners` list are all
/// set; anything less disables the override as a whole.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SubrouterConfig {
    pub url: Option<String>,
    pub registry_url: Option<String>,
    pub owners: Option<Vec<String>>,
    /// How long a resolved owner is trusted
    pub cache_ttl: String,
}

impl Default for SubrouterConfig {
    fn default() -> Self {
        Self {
            url: None,
            registry_url: None,
            owners: None,
            cache_ttl: "1h".to_string(),
        }
    }
}

impl SubrouterConfig {
    pub fn cache_ttl_duration(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.cache_ttl)
    }

    /// True when some but not all of the three required values are present.
    pub fn is_partial(&self) -> bool {
        let owners = self
            .owners
            .as_ref()
            .is_some_and(|o| o.iter().any(|s| !s.trim().is_empty()));
        let present = [self.url.is_some(), self.registry_url.is_some(), owners];
        present.iter().any(|p| *p) && !present.iter().all(|p| *p)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. "info" or "unit_router=debug,info"
    pub level: String,
    pub json: bool,
    pub include_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
            include_spans: true,
        }
    }
}

/// TLS termination with a PEM certificate chain and PKCS#8 key.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    pub cert_path: String,
    pub key_path: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Ordered host base URLs; must be identical on every gateway instance
    pub hosts: Vec<String>,
    pub unit: UnitKind,
    #[serde(default)]
    pub strategy: DispatchStrategy,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub subrouter: SubrouterConfig,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

impl RouterConfig {
    /// Create a new router configuration builder
    pub fn builder() -> RouterConfigBuilder {
        RouterConfigBuilder::default()
    }
}

/// Builder for RouterConfig to allow for cleaner configuration creation
pub struct RouterConfigBuilder {
    listen_addr: Option<String>,
    hosts: Vec<String>,
    unit: UnitKind,
    strategy: DispatchStrategy,
    timeouts: TimeoutConfig,
    subrouter: SubrouterConfig,
    max_body_bytes: usize,
}

impl Default for RouterConfigBuilder {
    fn default() -> Self {
        Self {
            listen_addr: None,
            hosts: Vec::new(),
            unit: UnitKind::Compute,
            strategy: DispatchStrategy::default(),
            timeouts: TimeoutConfig::default(),
            subrouter: SubrouterConfig::default(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl RouterConfigBuilder {
    /// Set the listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    /// Append a host to the end of the pool
    pub fn host(mut self, url: impl Into<String>) -> Self {
        self.hosts.push(url.into());
        self
    }

    pub fn unit(mut self, unit: UnitKind) -> Self {
        self.unit = unit;
        self
    }

    pub fn strategy(mut self, strategy: DispatchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn attempt_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.timeouts.attempt = timeout.into();
        self
    }

    pub fn registry_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.timeouts.registry = timeout.into();
        self
    }

    /// Enable the subrouter override
    pub fn subrouter(
        mut self,
        url: impl Into<String>,
        registry_url: impl Into<String>,
        owners: Vec<String>,
    ) -> Self {
        self.subrouter.url = Some(url.into());
        self.subrouter.registry_url = Some(registry_url.into());
        self.subrouter.owners = Some(owners);
        self
    }

    pub fn owner_cache_ttl(mut self, ttl: impl Into<String>) -> Self {
        self.subrouter.cache_ttl = ttl.into();
        self
    }

    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Build the final RouterConfig
    pub fn build(self) -> Result<RouterConfig, String> {
        if self.hosts.is_empty() {
            return Err("At least one host must be configured".to_string());
        }

        Ok(RouterConfig {
            listen_addr: self.listen_addr.unwrap_or_else(default_listen_addr),
            hosts: self.hosts,
            unit: self.unit,
            strategy: self.strategy,
            timeouts: self.timeouts,
            subrouter: self.subrouter,
            max_body_bytes: self.max_body_bytes,
            logging: LoggingConfig::default(),
            tls: None,
        })
    }
}
