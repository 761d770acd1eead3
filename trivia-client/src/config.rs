use std::env;
use std::str::FromStr;
use std::time::Duration;
use trivia_core::CoordinatorConfig;

use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub relay_url: String,
    pub backstop_url: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub generation_timeout: Duration,
    pub turn_intro: Duration,
    pub local_turn_intro: Duration,
    pub result_display: Duration,
    pub host_debounce: Duration,
    pub ack_timeout: Duration,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            relay_url: env::var("RELAY_URL").unwrap_or_else(|_| "ws://127.0.0.1:8080/ws".to_string()),
            backstop_url: env::var("BACKSTOP_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8080".to_string()),
            gemini_api_key: env::var("GEMINI_API_KEY").ok().filter(|key| !key.is_empty()),
            gemini_model: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-2.5-flash".to_string()),
            gemini_base_url: env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string()),
            generation_timeout: millis_var("GENERATION_TIMEOUT_MS", 15_000)?,
            turn_intro: millis_var("TURN_INTRO_MS", 1500)?,
            local_turn_intro: millis_var("LOCAL_TURN_INTRO_MS", 2000)?,
            result_display: millis_var("RESULT_DISPLAY_MS", 3000)?,
            host_debounce: millis_var("HOST_DEBOUNCE_MS", 100)?,
            ack_timeout: millis_var("ACK_TIMEOUT_MS", 5000)?,
        })
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            turn_intro: self.turn_intro,
            result_display: self.result_display,
            host_debounce: self.host_debounce,
            ..CoordinatorConfig::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://127.0.0.1:8080/ws".to_string(),
            backstop_url: "http://127.0.0.1:8080".to_string(),
            gemini_api_key: None,
            gemini_model: "gemini-2.5-flash".to_string(),
            gemini_base_url: "https://generativelanguage.googleapis.com".to_string(),
            generation_timeout: Duration::from_millis(15_000),
            turn_intro: Duration::from_millis(1500),
            local_turn_intro: Duration::from_millis(2000),
            result_display: Duration::from_millis(3000),
            host_debounce: Duration::from_millis(100),
            ack_timeout: Duration::from_millis(5000),
        }
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

fn millis_var(name: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    parse_var(name, default_ms).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_falls_back_to_default() {
        let value: u64 = parse_var("TRIVIA_TEST_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_coordinator_config_uses_timings() {
        let config = ClientConfig {
            turn_intro: Duration::from_millis(10),
            result_display: Duration::from_millis(20),
            host_debounce: Duration::from_millis(1),
            ..ClientConfig::default()
        };
        let coordinator = config.coordinator_config();
        assert_eq!(coordinator.turn_intro, Duration::from_millis(10));
        assert_eq!(coordinator.result_display, Duration::from_millis(20));
        assert_eq!(coordinator.min_players, 2);
    }
}
