//! Provider OAuth access-token cache with refresh-on-expiry.
//!
//! One cache per process. Concurrent refresh is tolerated: two simultaneous
//! refreshes waste one token request, correctness is unaffected.

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::ZoomConfig;
use crate::pool::JobError;
use crate::zoom::models::TokenResponse;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Cached `account_credentials`-grant access token.
pub struct TokenCache {
    http: Client,
    oauth_base: String,
    account_id: String,
    credential: String,
    cached: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    /// Build a cache from provider configuration.
    #[must_use]
    pub fn new(config: &ZoomConfig, http: Client) -> Self {
        Self {
            http,
            oauth_base: config.oauth_base.clone(),
            account_id: config.account_id.clone(),
            credential: config.client_credential.clone(),
            cached: RwLock::new(None),
        }
    }

    /// Current access token, refreshing first when expired.
    ///
    /// # Errors
    ///
    /// Returns `JobError::Timeout` on transport errors (retryable) or
    /// `JobError::Permanent` when the token endpoint rejects the grant.
    pub async fn access_token(&self) -> Result<String, JobError> {
        if let Some(token) = self.cached.read().await.as_ref() {
            if token.expires_at > Utc::now() {
                return Ok(token.access_token.clone());
            }
        }
        self.refresh().await
    }

    async fn refresh(&self) -> Result<String, JobError> {
        let url = format!(
            "{}/oauth/token?grant_type=account_credentials&account_id={}",
            self.oauth_base, self.account_id
        );
        let response = self
            .http
            .post(url)
            .header("Authorization", format!("Basic {}", self.credential))
            .send()
            .await
            .map_err(|err| JobError::from_transport(&err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(JobError::Permanent(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| JobError::Permanent(format!("token response parse failed: {err}")))?;

        let cached = CachedToken {
            access_token: token.access_token.clone(),
            expires_at: Utc::now() + Duration::seconds(token.expires_in),
        };
        debug!(expires_at = %cached.expires_at, "provider access token refreshed");
        *self.cached.write().await = Some(cached);
        Ok(token.access_token)
    }
}
