use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Business error reported by the exchange. `payload` carries the raw
    /// document so callers can inspect exchange-specific diagnostics.
    #[error("API error: {code} - {message}")]
    ApiError {
        code: String,
        message: String,
        payload: Option<Value>,
    },

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Connection timeout: {0}")]
    ConnectionTimeout(String),

    #[error("Request timed out: {0}")]
    RequestTimeout(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::core::config::ConfigError),
}

impl ExchangeError {
    /// Build an `ApiError` from the pieces of an exchange error envelope.
    pub fn api(code: impl Into<String>, message: impl Into<String>, payload: Option<Value>) -> Self {
        Self::ApiError {
            code: code.into(),
            message: message.into(),
            payload,
        }
    }

    /// Transport-level failures are the ones that warrant a reconnect.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::NetworkError(_)
                | Self::ConnectionTimeout(_)
                | Self::ConnectionClosed
                | Self::HttpError(_)
        )
    }
}
