//! Error handling for scrapechain

use reqwest::StatusCode;
use thiserror::Error;

/// Main error type for scrapechain operations
#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status} for {url}")]
    HttpStatus { status: StatusCode, url: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ScrapeError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        ScrapeError::InvalidArgument(message.into())
    }
}

/// Result type alias for scrapechain operations
pub type Result<T> = std::result::Result<T, ScrapeError>;
