//! Runtime configuration read from the environment (and `.env`).

use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:auditavel.db";
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub bind_addr: SocketAddr,
    /// Bearer token → admin id.
    pub admin_tokens: HashMap<String, String>,
    pub upload_dir: PathBuf,
    /// Prefix for image URLs handed to clients. Empty keeps them relative.
    pub public_base_url: String,
    pub max_image_bytes: usize,
    pub poll_close_interval: Duration,
    pub cors_permissive: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            database_max_connections: 5,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            admin_tokens: HashMap::new(),
            upload_dir: PathBuf::from("uploads"),
            public_base_url: String::new(),
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            poll_close_interval: Duration::from_secs(60),
            cors_permissive: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            database_url: get("DATABASE_URL").unwrap_or(defaults.database_url),
            database_max_connections: parse_var(&get, "DATABASE_MAX_CONNECTIONS")?
                .unwrap_or(defaults.database_max_connections),
            bind_addr: parse_var(&get, "BIND_ADDR")?.unwrap_or(defaults.bind_addr),
            admin_tokens: match get("ADMIN_TOKENS") {
                Some(raw) => parse_admin_tokens(&raw)?,
                None => defaults.admin_tokens,
            },
            upload_dir: get("UPLOAD_DIR").map(PathBuf::from).unwrap_or(defaults.upload_dir),
            public_base_url: get("PUBLIC_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.public_base_url),
            max_image_bytes: parse_var(&get, "MAX_IMAGE_BYTES")?.unwrap_or(defaults.max_image_bytes),
            poll_close_interval: parse_var(&get, "POLL_CLOSE_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_close_interval),
            cors_permissive: parse_var(&get, "CORS_PERMISSIVE")?.unwrap_or(defaults.cors_permissive),
        })
    }

    /// Admin id for a bearer token, if the token is known.
    pub fn admin_for_token(&self, token: &str) -> Option<&str> {
        self.admin_tokens.get(token).map(String::as_str)
    }
}

fn parse_var<T, G>(get: &G, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(var)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                var,
                reason: format!("'{}': {}", raw, e),
            })
        })
        .transpose()
}

/// Parses `id:token,id:token`.
fn parse_admin_tokens(raw: &str) -> Result<HashMap<String, String>, ConfigError> {
    let mut tokens = HashMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (id, token) = pair.split_once(':').ok_or_else(|| ConfigError::Invalid {
            var: "ADMIN_TOKENS",
            reason: format!("expected id:token, got '{}'", pair),
        })?;
        let (id, token) = (id.trim(), token.trim());
        if id.is_empty() || token.is_empty() {
            return Err(ConfigError::Invalid {
                var: "ADMIN_TOKENS",
                reason: format!("empty id or token in '{}'", pair),
            });
        }
        tokens.insert(token.to_string(), id.to_string());
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.bind_addr.port(), 3000);
        assert!(config.admin_tokens.is_empty());
        assert!(!config.cors_permissive);
    }

    #[test]
    fn reads_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("BIND_ADDR", "0.0.0.0:8080"),
            ("ADMIN_TOKENS", "alice:s3cret, bob:hunter2"),
            ("POLL_CLOSE_INTERVAL_SECS", "5"),
            ("PUBLIC_BASE_URL", "https://polls.example.org/"),
            ("CORS_PERMISSIVE", "true"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.admin_for_token("hunter2"), Some("bob"));
        assert_eq!(config.admin_for_token("alice"), None);
        assert_eq!(config.poll_close_interval, Duration::from_secs(5));
        assert_eq!(config.public_base_url, "https://polls.example.org");
        assert!(config.cors_permissive);
    }

    #[test]
    fn rejects_malformed_values() {
        let err = Config::from_lookup(lookup(&[("MAX_IMAGE_BYTES", "lots")])).unwrap_err();
        assert!(err.to_string().starts_with("MAX_IMAGE_BYTES"));

        assert!(Config::from_lookup(lookup(&[("ADMIN_TOKENS", "no-colon")])).is_err());
        assert!(Config::from_lookup(lookup(&[("ADMIN_TOKENS", "alice:")])).is_err());
    }
}
