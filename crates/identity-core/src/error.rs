//! Error types for identity and token operations

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Upstream identity provider unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type Result<T> = std::result::Result<T, IdentityError>;
