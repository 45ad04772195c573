//! REST-backed identity provider

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::debug;

use super::IdentityProvider;
use crate::config::ProviderConnection;
use crate::error::{IdentityError, Result};
use crate::types::{AccessToken, Identity, TokenScope};

const API_VERSION: &str = "2022-06-01";
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Identity provider speaking the hosted service's REST API.
///
/// The access key from the connection string is sent as a bearer credential.
/// Per-request HMAC signing is not implemented here; point this at a
/// gateway that accepts the key directly or signs on your behalf.
pub struct HttpIdentityProvider {
    http: reqwest::Client,
    endpoint: String,
    access_key: String,
}

#[derive(Debug, Deserialize)]
struct CreateIdentityResponse {
    identity: IdentityBody,
}

#[derive(Debug, Deserialize)]
struct IdentityBody {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueTokenResponse {
    access_token: TokenBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenBody {
    token: String,
    expires_on: DateTime<Utc>,
}

impl HttpIdentityProvider {
    pub fn new(connection: ProviderConnection) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| IdentityError::InternalError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint: connection.endpoint,
            access_key: connection.access_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}?api-version={}", self.endpoint, path, API_VERSION)
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn create_identity(&self) -> Result<Identity> {
        let url = self.url("/identities");
        debug!(%url, "creating identity at provider");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.access_key)
            .json(&serde_json::json!({}))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(IdentityError::UpstreamUnavailable(format!(
                "identity create returned {status}"
            )));
        }

        let parsed: CreateIdentityResponse = response.json().await?;
        Ok(Identity::new(parsed.identity.id))
    }

    async fn issue_token(
        &self,
        identity: &Identity,
        scopes: &[TokenScope],
        ttl: Duration,
    ) -> Result<AccessToken> {
        let url = self.url(&format!("/identities/{}/:issueAccessToken", identity.as_str()));
        debug!(%url, "requesting token from provider");

        let body = serde_json::json!({
            "scopes": scopes,
            "expiresInMinutes": ttl.num_minutes(),
        });
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.access_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(IdentityError::UpstreamUnavailable(format!(
                "token issue returned {status}"
            )));
        }

        let parsed: IssueTokenResponse = response.json().await?;
        Ok(AccessToken {
            token: parsed.access_token.token,
            expires_on: parsed.access_token.expires_on,
        })
    }
}
