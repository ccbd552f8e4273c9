// src/error.rs
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("Navigation timed out: {url} exceeded {seconds} seconds")]
    NavigationTimeout {
        url: String,
        seconds: u64,
    },

    #[error("Renderer crashed while loading {url}: {message}")]
    RenderCrash {
        url: String,
        message: String,
    },

    #[error("Extraction timed out on {0}")]
    ExtractionTimeout(String),

    #[error("Rate limit exceeded for analysis key #{key_index}")]
    RateLimitExceeded {
        key_index: usize,
    },

    #[error("Analysis payload too large")]
    PayloadTooLarge,

    #[error("Could not extract JSON from analysis response: {0}")]
    JsonParse(String),

    #[error("Analysis response failed schema validation: {0}")]
    SchemaValidation(String),

    #[error("Quota exhausted: no analysis credentials are available, add keys or wait for cooldown")]
    QuotaExhausted,

    #[error("Invalid seed URL: {0}")]
    InvalidSeed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("File error: {path:?} - {message}")]
    FileError {
        path: PathBuf,
        message: String,
    },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unexpected error: {0}")]
    UnexpectedError(String),
}

impl From<anyhow::Error> for ScoutError {
    fn from(error: anyhow::Error) -> Self {
        ScoutError::UnexpectedError(error.to_string())
    }
}

impl From<serde_json::Error> for ScoutError {
    fn from(error: serde_json::Error) -> Self {
        ScoutError::SerializationError(error.to_string())
    }
}

pub type ScoutResult<T> = std::result::Result<T, ScoutError>;
