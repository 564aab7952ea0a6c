//! Application configuration loaded from environment variables.

use std::time::Duration;

use cart::EngineConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: PostgreSQL connection string; in-memory store when unset
/// - `CART_CACHE_TTL_SECS`: cart view cache expiry (default: `600`)
/// - `CART_MAX_CONCURRENCY`: per-batch worker cap (default: `16`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub cache_ttl_secs: u64,
    pub max_concurrency: usize,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            cache_ttl_secs: lookup("CART_CACHE_TTL_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.cache_ttl_secs),
            max_concurrency: lookup("CART_MAX_CONCURRENCY")
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrency),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig::new(
            self.max_concurrency,
            Duration::from_secs(self.cache_ttl_secs),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            cache_ttl_secs: 600,
            max_concurrency: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.database_url, None);
        assert_eq!(config.cache_ttl_secs, 600);
        assert_eq!(config.max_concurrency, 16);
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_values_from_lookup() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "8081"),
            ("DATABASE_URL", "postgres://localhost/carts"),
            ("CART_CACHE_TTL_SECS", "30"),
            ("CART_MAX_CONCURRENCY", "4"),
        ]));
        assert_eq!(config.port, 8081);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/carts")
        );

        let engine = config.engine();
        assert_eq!(engine.max_concurrency, 4);
        assert_eq!(engine.cache_ttl, Duration::from_secs(30));
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "not-a-port"),
            ("CART_MAX_CONCURRENCY", "0"),
            ("DATABASE_URL", ""),
        ]));
        assert_eq!(config.port, 3000);
        assert_eq!(config.max_concurrency, 16);
        assert_eq!(config.database_url, None);
    }
}
