use reqwest::StatusCode;
use thiserror::Error;
use trivia_types::GameError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to connect to relay: {0}")]
    Connect(String),

    #[error("Transport closed")]
    Closed,

    #[error("Not subscribed to channel {0}")]
    NotSubscribed(String),

    #[error("Relay rejected message: {0}")]
    Rejected(String),

    #[error("No acknowledgement for request {request_id}")]
    AckTimeout { request_id: u64 },

    #[error("Failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("Question generator is not configured")]
    NotConfigured,

    #[error("Http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Api error: {0} - {1}")]
    Api(StatusCode, String),

    #[error("Unusable generator response: {0}")]
    Parse(String),

    #[error("Question generation timed out")]
    Timeout,
}

#[derive(Debug, Error)]
pub enum BackstopError {
    #[error("Http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Api error: {0} - {1}")]
    Api(StatusCode, String),

    #[error("Not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Game(#[from] GameError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Backstop(#[from] BackstopError),

    #[error("Session is closed")]
    Closed,
}
