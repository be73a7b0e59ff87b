use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LLMError {
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("API key not set for provider: {0}")]
    MissingApiKey(String),

    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Request blocked by provider: {0}")]
    Blocked(String),

    #[error("Assistant timed out after {0:?}")]
    Timeout(Duration),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LLMError {
    /// True when the upstream did not answer in time
    pub fn is_timeout(&self) -> bool {
        match self {
            LLMError::Timeout(_) => true,
            LLMError::HttpRequest(e) => e.is_timeout(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, LLMError>;
