//! Configuration for identity-core

use serde::Deserialize;

use crate::error::{IdentityError, Result};

/// Main configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// Provider connection string, `endpoint=https://...;accesskey=...`.
    /// Empty means no hosted provider is configured.
    pub connection: String,
    /// Opens the secondary identity slot once the primary identity has
    /// retrieved a token. Used to simulate a second participant.
    pub enable_multiple_users: bool,
    /// Bind address for the REST API.
    pub api_bind_address: String,
}

impl IdentityConfig {
    /// Load configuration from `VCALL_`-prefixed environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let settings = config::Config::builder()
            .set_default("connection", defaults.connection)
            .and_then(|b| b.set_default("enable_multiple_users", defaults.enable_multiple_users))
            .and_then(|b| b.set_default("api_bind_address", defaults.api_bind_address))
            .map(|b| b.add_source(config::Environment::with_prefix("VCALL").try_parsing(true)))
            .and_then(|b| b.build())
            .map_err(|e| IdentityError::ConfigError(e.to_string()))?;

        settings
            .try_deserialize()
            .map_err(|e| IdentityError::ConfigError(e.to_string()))
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            connection: String::new(),
            enable_multiple_users: false,
            api_bind_address: "127.0.0.1:8080".to_string(),
        }
    }
}

/// Parsed provider connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConnection {
    pub endpoint: String,
    pub access_key: String,
}

impl ProviderConnection {
    /// Parse an `endpoint=...;accesskey=...` connection string.
    ///
    /// Segment order is not significant and key names are matched
    /// case-insensitively. Only the first `=` in a segment separates key
    /// from value, so base64 access keys with `=` padding survive.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut endpoint = None;
        let mut access_key = None;

        for segment in raw.split(';').filter(|s| !s.trim().is_empty()) {
            let Some((key, value)) = segment.split_once('=') else {
                return Err(IdentityError::ConfigError(format!(
                    "malformed connection segment: {segment}"
                )));
            };
            match key.trim().to_ascii_lowercase().as_str() {
                "endpoint" => endpoint = Some(value.trim().trim_end_matches('/').to_string()),
                "accesskey" => access_key = Some(value.trim().to_string()),
                other => {
                    return Err(IdentityError::ConfigError(format!(
                        "unknown connection key: {other}"
                    )));
                }
            }
        }

        let endpoint = endpoint
            .filter(|e| !e.is_empty())
            .ok_or_else(|| IdentityError::ConfigError("connection string missing endpoint".to_string()))?;
        let access_key = access_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| IdentityError::ConfigError("connection string missing accesskey".to_string()))?;

        Ok(Self { endpoint, access_key })
    }
}
