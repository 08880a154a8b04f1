//! Collector configuration.
//!
//! Built once at startup, then shared read-only by every request.

use crate::cookie::DEFAULT_COOKIE_MAX_AGE;
use crate::error::{ServerError, ServerResult};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use zeroize::Zeroizing;

/// Environment variable holding the PostgreSQL connection string.
pub const ENV_PG_URL: &str = "RISA_PG_URL";
/// Environment variable holding the cookie-signing key.
pub const ENV_COOKIE_SECRET: &str = "RISA_COOKIE_SECRET";
/// Environment variable holding the request-signing shared secret.
pub const ENV_SECRET: &str = "RISA_SECRET";
/// Environment variable holding the allowed CORS origin.
pub const ENV_ALLOW_ORIGIN: &str = "RISA_ALLOW_ORIGIN";
/// Environment variable holding the listen port.
pub const ENV_PORT: &str = "RISA_PORT";
/// Environment variable holding the connection pool size.
pub const ENV_PG_MAX_CONNECTIONS: &str = "RISA_PG_MAX_CONNECTIONS";

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Configuration for the collector.
#[derive(Clone)]
pub struct CollectorConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// PostgreSQL connection string.
    pub database_url: Option<String>,
    /// Maximum pooled store connections.
    pub max_connections: u32,
    /// Key for signing the session cookie.
    pub cookie_secret: Zeroizing<Vec<u8>>,
    /// Shared secret for request signatures. `None` disables verification.
    pub signing_secret: Option<Zeroizing<Vec<u8>>>,
    /// Origin allowed to make credentialed cross-origin requests.
    pub allow_origin: Option<String>,
    /// Session cookie lifetime.
    pub cookie_max_age: Duration,
}

impl CollectorConfig {
    /// Creates a configuration with the given cookie key and defaults
    /// elsewhere.
    pub fn new(cookie_secret: Vec<u8>) -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            cookie_secret: Zeroizing::new(cookie_secret),
            signing_secret: None,
            allow_origin: None,
            cookie_max_age: DEFAULT_COOKIE_MAX_AGE,
        }
    }

    /// Loads configuration from the process environment.
    pub fn from_env() -> ServerResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary variable lookup.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> ServerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let cookie_secret = get(ENV_COOKIE_SECRET)
            .ok_or_else(|| ServerError::config(format!("{ENV_COOKIE_SECRET} must be set")))?;
        let mut config = Self::new(cookie_secret.into_bytes());

        if let Some(url) = get(ENV_PG_URL) {
            config = config.with_database_url(url);
        }
        if let Some(secret) = get(ENV_SECRET) {
            config = config.with_signing_secret(secret.into_bytes());
        }
        if let Some(origin) = get(ENV_ALLOW_ORIGIN) {
            config = config.with_allow_origin(origin);
        }
        if let Some(port) = get(ENV_PORT) {
            let port: u16 = port
                .parse()
                .map_err(|_| ServerError::config(format!("{ENV_PORT} is not a port: {port}")))?;
            config = config.with_port(port);
        }
        if let Some(max) = get(ENV_PG_MAX_CONNECTIONS) {
            let max: u32 = max.parse().map_err(|_| {
                ServerError::config(format!("{ENV_PG_MAX_CONNECTIONS} is not a number: {max}"))
            })?;
            config = config.with_max_connections(max);
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks invariants that builder methods cannot enforce alone.
    pub fn validate(&self) -> ServerResult<()> {
        if self.cookie_secret.is_empty() {
            return Err(ServerError::config("cookie secret must not be empty"));
        }
        if self.max_connections == 0 {
            return Err(ServerError::config("max connections must be at least 1"));
        }
        Ok(())
    }

    /// Sets the bind address.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Sets the listen port, keeping the bind IP.
    pub fn with_port(mut self, port: u16) -> Self {
        self.bind_addr.set_port(port);
        self
    }

    /// Sets the PostgreSQL connection string.
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Sets the store pool size.
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Requires requests to be signed with `secret`. An empty secret
    /// disables verification.
    pub fn with_signing_secret(mut self, secret: Vec<u8>) -> Self {
        self.signing_secret = Some(secret)
            .filter(|s| !s.is_empty())
            .map(Zeroizing::new);
        self
    }

    /// Enables CORS headers for `origin`. An empty origin disables them.
    pub fn with_allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.allow_origin = Some(origin.into()).filter(|o| !o.is_empty());
        self
    }

    /// Sets the session cookie lifetime.
    pub fn with_cookie_max_age(mut self, max_age: Duration) -> Self {
        self.cookie_max_age = max_age;
        self
    }
}

impl fmt::Debug for CollectorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectorConfig")
            .field("bind_addr", &self.bind_addr)
            .field("database_url", &self.database_url.as_ref().map(|_| "<set>"))
            .field("max_connections", &self.max_connections)
            .field("signing_enabled", &self.signing_secret.is_some())
            .field("allow_origin", &self.allow_origin)
            .field("cookie_max_age", &self.cookie_max_age)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config() {
        let config = CollectorConfig::new(b"key".to_vec());
        assert_eq!(config.bind_addr.port(), 8080);
        assert!(config.signing_secret.is_none());
        assert!(config.allow_origin.is_none());
        assert_eq!(config.cookie_max_age, DEFAULT_COOKIE_MAX_AGE);
    }

    #[test]
    fn config_builder() {
        let config = CollectorConfig::new(b"key".to_vec())
            .with_bind_addr("127.0.0.1:9000".parse().unwrap())
            .with_max_connections(4)
            .with_signing_secret(b"sekret".to_vec())
            .with_allow_origin("https://example.com");

        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.max_connections, 4);
        assert_eq!(
            config.signing_secret.as_deref().map(Vec::as_slice),
            Some(&b"sekret"[..])
        );
        assert_eq!(config.allow_origin.as_deref(), Some("https://example.com"));
    }

    #[test]
    fn empty_values_disable_options() {
        let config = CollectorConfig::new(b"key".to_vec())
            .with_signing_secret(Vec::new())
            .with_allow_origin("");
        assert!(config.signing_secret.is_none());
        assert!(config.allow_origin.is_none());
    }

    #[test]
    fn from_lookup_reads_all_variables() {
        let config = CollectorConfig::from_lookup(lookup(&[
            (ENV_COOKIE_SECRET, "cookie"),
            (ENV_PG_URL, "postgres://localhost/risa"),
            (ENV_SECRET, "sekret"),
            (ENV_ALLOW_ORIGIN, "https://example.com"),
            (ENV_PORT, "9090"),
            (ENV_PG_MAX_CONNECTIONS, "3"),
        ]))
        .unwrap();

        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/risa"));
        assert!(config.signing_secret.is_some());
        assert_eq!(config.allow_origin.as_deref(), Some("https://example.com"));
        assert_eq!(config.bind_addr.port(), 9090);
        assert_eq!(config.max_connections, 3);
    }

    #[test]
    fn from_lookup_treats_empty_as_unset() {
        let config = CollectorConfig::from_lookup(lookup(&[
            (ENV_COOKIE_SECRET, "cookie"),
            (ENV_SECRET, ""),
            (ENV_ALLOW_ORIGIN, ""),
        ]))
        .unwrap();
        assert!(config.signing_secret.is_none());
        assert!(config.allow_origin.is_none());
        assert!(config.database_url.is_none());
    }

    #[test]
    fn from_lookup_requires_cookie_secret() {
        let err = CollectorConfig::from_lookup(lookup(&[(ENV_COOKIE_SECRET, "")])).unwrap_err();
        assert!(err.to_string().contains(ENV_COOKIE_SECRET));
    }

    #[test]
    fn from_lookup_rejects_bad_port() {
        let result = CollectorConfig::from_lookup(lookup(&[
            (ENV_COOKIE_SECRET, "cookie"),
            (ENV_PORT, "http"),
        ]));
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = CollectorConfig::new(b"cookie-key".to_vec())
            .with_signing_secret(b"sekret".to_vec())
            .with_database_url("postgres://user:hunter2@db/risa");
        let out = format!("{config:?}");
        assert!(!out.contains("cookie-key"));
        assert!(!out.contains("sekret"));
        assert!(!out.contains("hunter2"));
    }
}
