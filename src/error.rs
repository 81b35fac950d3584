//! Error types shared across the request pipeline

use thiserror::Error;

/// Failure talking to the geolocation provider. Never cached, never shown to clients.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("geolocation request failed: {0}")]
    Http(#[source] reqwest::Error),
    #[error("geolocation request timed out")]
    Timeout,
    #[error("geolocation provider returned HTTP {0}")]
    Status(u16),
    #[error("geolocation provider error: {0}")]
    Provider(String),
}

impl From<reqwest::Error> for LookupError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LookupError::Timeout
        } else {
            LookupError::Http(e)
        }
    }
}

/// The blocklist could not be consulted, so the request cannot be let through safely.
#[derive(Debug, Error)]
#[error("block check failed for {ip}: {source}")]
pub struct BlockCheckError {
    pub ip: String,
    #[source]
    pub source: anyhow::Error,
}

/// Best-effort writes that callers inspect and then deliberately drop.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("geo cache write failed: {0}")]
    Cache(#[source] anyhow::Error),
    #[error("request log write failed: {0}")]
    Log(#[source] anyhow::Error),
}
