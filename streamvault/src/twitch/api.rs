//! Helix API operations used by the core.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde_json::json;
use tracing::{debug, warn};

use super::auth::TwitchAuth;
use super::models::{EventSubSubscription, HelixPage, TwitchGame, TwitchStream, TwitchUser};
use crate::domain::value_objects::RetryPolicy;
use crate::{Error, Result};

const HELIX_BASE: &str = "https://api.twitch.tv/helix";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Helix client with bounded retries.
///
/// 401 triggers one token refresh and retry; other 4xx are permanent;
/// 5xx and transport errors retry with exponential backoff.
pub struct TwitchApiClient {
    auth: Arc<TwitchAuth>,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl TwitchApiClient {
    pub fn new(auth: Arc<TwitchAuth>, http: reqwest::Client) -> Self {
        Self {
            auth,
            http,
            retry: RetryPolicy::twitch_api(),
        }
    }

    pub async fn get_users_by_login(&self, logins: &[String]) -> Result<Vec<TwitchUser>> {
        let query: Vec<(&str, &str)> = logins.iter().map(|l| ("login", l.as_str())).collect();
        let page: HelixPage<TwitchUser> = self.get("users", &query).await?;
        Ok(page.data)
    }

    pub async fn get_users_by_id(&self, ids: &[String]) -> Result<Vec<TwitchUser>> {
        let query: Vec<(&str, &str)> = ids.iter().map(|id| ("id", id.as_str())).collect();
        let page: HelixPage<TwitchUser> = self.get("users", &query).await?;
        Ok(page.data)
    }

    /// Live streams for the given user ids; offline users are absent.
    pub async fn get_streams_by_user_ids(&self, user_ids: &[String]) -> Result<Vec<TwitchStream>> {
        let query: Vec<(&str, &str)> = user_ids.iter().map(|id| ("user_id", id.as_str())).collect();
        let page: HelixPage<TwitchStream> = self.get("streams", &query).await?;
        Ok(page.data)
    }

    pub async fn get_games_by_id(&self, game_ids: &[String]) -> Result<Vec<TwitchGame>> {
        let query: Vec<(&str, &str)> = game_ids.iter().map(|id| ("id", id.as_str())).collect();
        let page: HelixPage<TwitchGame> = self.get("games", &query).await?;
        Ok(page.data)
    }

    /// Create a webhook-transport EventSub subscription.
    pub async fn create_eventsub_subscription(
        &self,
        kind: &str,
        broadcaster_id: &str,
        callback_url: &str,
        secret: &str,
    ) -> Result<EventSubSubscription> {
        let body = json!({
            "type": kind,
            "version": "1",
            "condition": { "broadcaster_user_id": broadcaster_id },
            "transport": {
                "method": "webhook",
                "callback": callback_url,
                "secret": secret,
            },
        });
        let page: HelixPage<EventSubSubscription> = self
            .request(Method::POST, "eventsub/subscriptions", &[], Some(body))
            .await?;
        page.data
            .into_iter()
            .next()
            .ok_or_else(|| Error::TwitchApi("subscription response carried no data".to_string()))
    }

    pub async fn delete_eventsub_subscription(&self, subscription_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .request(
                Method::DELETE,
                "eventsub/subscriptions",
                &[("id", subscription_id)],
                None,
            )
            .await?;
        Ok(())
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        self.request(Method::GET, path, query, None).await
    }

    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let url = format!("{HELIX_BASE}/{path}");
        let mut attempt: u32 = 0;
        let mut refreshed = false;

        loop {
            let token = self.auth.token().await?;
            let mut request = self
                .http
                .request(method.clone(), &url)
                .header("Client-Id", self.auth.client_id())
                .bearer_auth(&token)
                .query(query)
                .timeout(REQUEST_TIMEOUT);
            if let Some(body) = &body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    if self.retry.should_retry(attempt) {
                        let delay = self.retry.delay_for_attempt(attempt);
                        warn!(url = %url, attempt, error = %e, "Transport error; retrying");
                        attempt += 1;
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(Error::Http(e));
                }
            };

            let status = response.status();
            if status.is_success() {
                if status == StatusCode::NO_CONTENT {
                    return Ok(serde_json::from_value(serde_json::Value::Null)?);
                }
                return Ok(response.json().await?);
            }

            if status == StatusCode::UNAUTHORIZED && !refreshed {
                debug!(url = %url, "401 from Helix; refreshing token once");
                refreshed = true;
                self.auth.refresh().await?;
                continue;
            }

            if status.is_server_error() && self.retry.should_retry(attempt) {
                let delay = self.retry.delay_for_attempt(attempt);
                warn!(url = %url, %status, attempt, "Server error; retrying");
                attempt += 1;
                tokio::time::sleep(delay).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(Error::TwitchApi(format!("{status} from {url}: {body}")));
        }
    }
}
