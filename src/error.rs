use thiserror::Error;

use crate::v1a::SignError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Signing failed: {0}")]
    Sign(#[from] SignError),

    #[error("Failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[cfg(feature = "reqwest")]
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Deserialization failed: {0}")]
    DeserializationFailed(#[from] serde_json::Error),

    /// Non-2xx answer from the brokerage, including authentication rejections.
    #[error("API error: status {status}, body: {body}")]
    Api { status: u16, body: String },

    #[error("Unexpected response shape: {0}")]
    UnexpectedResponse(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Strategy error: {0}")]
    Strategy(String),
}

pub type Result<T> = std::result::Result<T, Error>;
