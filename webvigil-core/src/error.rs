use thiserror::Error;

/// Errors produced by the monitoring engine.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status} for {url}: {excerpt}")]
    HttpStatus {
        url: String,
        status: u16,
        excerpt: String,
    },

    #[error("content_too_large: {url} body exceeds {limit} bytes")]
    ContentTooLarge { url: String, limit: usize },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("history store error: {0}")]
    Store(#[source] anyhow::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
