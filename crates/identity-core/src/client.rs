//! HTTP client for the identity endpoints
//!
//! Enabled with the `client` feature. Demos and the softphone example in
//! the client crate use it to fetch credentials from a running backend.

use crate::error::{IdentityError, Result};

/// Thin client for the two user endpoints.
#[derive(Debug, Clone)]
pub struct IdentityApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl IdentityApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base: String = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base.trim_end_matches('/').to_string(),
        }
    }

    /// `GET /api/user/identity`
    pub async fn identity(&self) -> Result<String> {
        self.get_text("/api/user/identity").await
    }

    /// `GET /api/user/token`
    pub async fn token(&self) -> Result<String> {
        self.get_text("/api/user/token").await
    }

    async fn get_text(&self, path: &str) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IdentityError::UpstreamUnavailable(format!(
                "{url} returned {status}: {body}"
            )));
        }
        Ok(response.text().await?)
    }
}
