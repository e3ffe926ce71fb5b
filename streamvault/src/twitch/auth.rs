//! App access token management (client-credentials flow).

use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, info};

use super::models::AppAccessToken;
use crate::{Error, Result};

const TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";

/// Refresh this long before the reported expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(300);

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Client-credentials token provider with in-memory caching.
pub struct TwitchAuth {
    client_id: String,
    client_secret: String,
    http: reqwest::Client,
    cached: RwLock<Option<CachedToken>>,
}

impl TwitchAuth {
    pub fn new(client_id: String, client_secret: String, http: reqwest::Client) -> Self {
        Self {
            client_id,
            client_secret,
            http,
            cached: RwLock::new(None),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Current token, fetching a fresh one when missing or near expiry.
    pub async fn token(&self) -> Result<String> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref()
                && token.expires_at > Instant::now()
            {
                return Ok(token.token.clone());
            }
        }
        self.refresh().await
    }

    /// Drop the cache and fetch a new token. Used after a 401.
    pub async fn refresh(&self) -> Result<String> {
        let mut cached = self.cached.write().await;

        debug!("Requesting app access token");
        let response = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .timeout(Duration::from_secs(30))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::TwitchApi(format!(
                "token request failed with {status}: {body}"
            )));
        }

        let token: AppAccessToken = response.json().await?;
        let expires_at = Instant::now()
            + Duration::from_secs(token.expires_in).saturating_sub(EXPIRY_MARGIN);
        info!(expires_in = token.expires_in, "Obtained app access token");

        let value = token.access_token.clone();
        *cached = Some(CachedToken {
            token: token.access_token,
            expires_at,
        });
        Ok(value)
    }
}
