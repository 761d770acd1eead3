use std::env;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub echo_to_sender: bool,
    pub rate_limit_burst: u32,
    pub rate_limit_refill_ms: u64,
    pub connection_timeout_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from any variable source; unset names take defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT", defaults.port)?,
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            echo_to_sender: parse_var(&lookup, "ECHO_TO_SENDER", defaults.echo_to_sender)?,
            rate_limit_burst: parse_var(&lookup, "RATE_LIMIT_BURST", defaults.rate_limit_burst)?,
            rate_limit_refill_ms: parse_var(
                &lookup,
                "RATE_LIMIT_REFILL_MS",
                defaults.rate_limit_refill_ms,
            )?,
            connection_timeout_seconds: parse_var(
                &lookup,
                "CONNECTION_TIMEOUT_SECONDS",
                defaults.connection_timeout_seconds,
            )?,
        })
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            database_url: "sqlite://trivia.db?mode=rwc".to_string(),
            echo_to_sender: false,
            rate_limit_burst: 60,
            rate_limit_refill_ms: 250,
            connection_timeout_seconds: 300,
        }
    }
}
