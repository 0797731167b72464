use std::path::Path;

use config::{Config, Environment, File, FileFormat, Map};
use eyre::{Context, Result};

use crate::config::models::RouterConfig;

/// Prefix for environment overrides, e.g. `UNIT_ROUTER_STRATEGY=redirect`.
pub const ENV_PREFIX: &str = "UNIT_ROUTER";

/// Default configuration written by `unit-router init`.
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Unit Router Configuration

# The address to listen on
listen_addr = "127.0.0.1:8080"

# Ordered host pool. Every gateway instance must list the same hosts in the
# same order, otherwise process placement diverges between instances.
hosts = ["http://localhost:6363", "http://localhost:6364"]

# compute | messenger
unit = "compute"

# proxy (forward with failover) | redirect (307 to the primary host)
strategy = "proxy"

# Largest request body buffered for forwarding and process id extraction
max_body_bytes = 10485760

[timeouts]
attempt = "5s"
registry = "2s"

# Owner-based override. Requires url, registry_url and owners together.
# [subrouter]
# url = "http://localhost:6400"
# registry_url = "https://arweave.net/graphql"
# owners = ["owner-address"]
# cache_ttl = "1h"

[logging]
level = "info"
json = true
include_spans = true

# [tls]
# cert_path = "cert.pem"
# key_path = "key.pem"
"#;

/// Load configuration from a file using the config crate
/// Supports multiple formats: YAML, JSON, TOML, etc.
pub async fn load_config(config_path: &str) -> Result<RouterConfig> {
    load_config_sync(config_path)
}

/// Load configuration synchronously, applying `UNIT_ROUTER_*` environment overrides
pub fn load_config_sync(config_path: &str) -> Result<RouterConfig> {
    load_config_with_env(config_path, None)
}

/// Load configuration with an explicit environment map instead of the process environment.
///
/// Nested keys use `__` (`UNIT_ROUTER_TIMEOUTS__ATTEMPT=1s`); `hosts` and
/// `subrouter.owners` accept comma-separated lists.
pub fn load_config_with_env(
    config_path: &str,
    env: Option<Map<String, String>>,
) -> Result<RouterConfig> {
    let config_path = Path::new(config_path);

    // Determine file format based on extension
    let format = match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        _ => FileFormat::Toml,
    };

    let environment = Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("hosts")
        .with_list_parse_key("subrouter.owners")
        .try_parsing(true)
        .source(env);

    let settings = Config::builder()
        .add_source(File::new(
            config_path
                .to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
            format,
        ))
        .add_source(environment)
        .build()
        .with_context(|| format!("Failed to build config from {}", config_path.display()))?;

    let router_config: RouterConfig = settings.try_deserialize().with_context(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })?;

    Ok(router_config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::config::models::{DispatchStrategy, UnitKind};

    fn write_temp(suffix: &str, content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::with_suffix(suffix).unwrap();
        write!(temp_file, "{}", content).unwrap();
        temp_file
    }

    #[tokio::test]
    async fn test_load_toml_config() {
        let toml_content = r#"
listen_addr = "127.0.0.1:3000"
hosts = ["http://cu1:6363", "http://cu2:6363", "http://cu3:6363"]
unit = "compute"

[subrouter]
url = "http://sub:6363"
registry_url = "http://registry/graphql"
owners = ["vip"]
"#;
        let temp_file = write_temp(".toml", toml_content);

        let config = load_config_with_env(temp_file.path().to_str().unwrap(), Some(Map::new()))
            .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:3000");
        assert_eq!(config.hosts.len(), 3);
        assert_eq!(config.unit, UnitKind::Compute);
        assert_eq!(config.strategy, DispatchStrategy::Proxy);
        assert_eq!(config.subrouter.owners, Some(vec!["vip".to_string()]));
        assert_eq!(config.subrouter.cache_ttl, "1h");
        assert!(config.tls.is_none());
    }

    #[tokio::test]
    async fn test_load_yaml_config() {
        let yaml_content = r#"
hosts:
  - "http://mu1:3004"
unit: "messenger"
strategy: "redirect"
timeouts:
  attempt: "750ms"
"#;
        let temp_file = write_temp(".yaml", yaml_content);

        let config = load_config_with_env(temp_file.path().to_str().unwrap(), Some(Map::new()))
            .unwrap();
        assert_eq!(config.unit, UnitKind::Messenger);
        assert_eq!(config.strategy, DispatchStrategy::Redirect);
        assert_eq!(config.timeouts.attempt, "750ms");
        assert_eq!(config.timeouts.registry, "2s");
    }

    #[test]
    fn test_environment_overrides_file() {
        let temp_file = write_temp(
            ".toml",
            r#"
hosts = ["http://a"]
unit = "compute"
"#,
        );

        let mut env = Map::new();
        env.insert("UNIT_ROUTER_STRATEGY".to_string(), "redirect".to_string());
        env.insert(
            "UNIT_ROUTER_HOSTS".to_string(),
            "http://x,http://y".to_string(),
        );
        env.insert("UNIT_ROUTER_TIMEOUTS__ATTEMPT".to_string(), "1s".to_string());

        let config = load_config_with_env(temp_file.path().to_str().unwrap(), Some(env)).unwrap();
        assert_eq!(config.strategy, DispatchStrategy::Redirect);
        assert_eq!(config.hosts, vec!["http://x", "http://y"]);
        assert_eq!(config.timeouts.attempt, "1s");
    }

    #[test]
    fn test_missing_unit_is_an_error() {
        let temp_file = write_temp(".toml", r#"hosts = ["http://a"]"#);
        assert!(
            load_config_with_env(temp_file.path().to_str().unwrap(), Some(Map::new())).is_err()
        );
    }

    #[test]
    fn test_default_template_parses() {
        let temp_file = write_temp(".toml", DEFAULT_CONFIG_TEMPLATE);
        let config = load_config_with_env(temp_file.path().to_str().unwrap(), Some(Map::new()))
            .unwrap();
        assert_eq!(config.hosts.len(), 2);
        assert!(config.subrouter.url.is_none());
    }
}
