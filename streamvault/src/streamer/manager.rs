//! Add/remove of broadcasters, including their EventSub subscriptions.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::database::repositories::{
    StreamRepository, StreamerRepository, SubscriptionRepository,
};
use crate::domain::Streamer;
use crate::jobs::JobQueue;
use crate::recorder::RecordingOrchestrator;
use crate::twitch::TwitchApiClient;
use crate::{Error, Result};

/// Subscription types maintained per streamer.
const EVENTSUB_TYPES: &[&str] = &["stream.online", "stream.offline", "channel.update"];

/// Registration service: resolves logins against Twitch, persists the
/// streamer, and keeps the EventSub subscriptions in step.
pub struct StreamerManager {
    streamers: Arc<dyn StreamerRepository>,
    streams: Arc<dyn StreamRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    orchestrator: Arc<RecordingOrchestrator>,
    queue: Arc<JobQueue>,
    twitch: Option<Arc<TwitchApiClient>>,
    /// Public callback URL for webhook subscriptions.
    callback_url: String,
    eventsub_secret: String,
}

impl StreamerManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        streamers: Arc<dyn StreamerRepository>,
        streams: Arc<dyn StreamRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        orchestrator: Arc<RecordingOrchestrator>,
        queue: Arc<JobQueue>,
        twitch: Option<Arc<TwitchApiClient>>,
        callback_url: String,
        eventsub_secret: String,
    ) -> Self {
        Self {
            streamers,
            streams,
            subscriptions,
            orchestrator,
            queue,
            twitch,
            callback_url,
            eventsub_secret,
        }
    }

    /// Register a broadcaster by login name.
    pub async fn add_streamer(&self, login: &str) -> Result<Streamer> {
        let login = login.trim().to_lowercase();
        if login.is_empty() {
            return Err(Error::validation("login must not be empty"));
        }
        if self.streamers.get_by_username(&login).await?.is_some() {
            return Err(Error::validation(format!("streamer {login} already exists")));
        }

        let Some(twitch) = &self.twitch else {
            return Err(Error::config(
                "Twitch API credentials required to add streamers",
            ));
        };

        let user = twitch
            .get_users_by_login(&[login.clone()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found("TwitchUser", login.clone()))?;

        let streamer = self
            .streamers
            .create(&Streamer {
                id: 0,
                twitch_id: user.id.clone(),
                username: user.login.clone(),
                display_name: user.display_name.clone(),
                profile_image_url: Some(user.profile_image_url.clone())
                    .filter(|u| !u.is_empty()),
                title: None,
                category_name: None,
                language: None,
                is_live: false,
                recording_enabled: true,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await?;

        for kind in EVENTSUB_TYPES {
            match twitch
                .create_eventsub_subscription(
                    kind,
                    &user.id,
                    &self.callback_url,
                    &self.eventsub_secret,
                )
                .await
            {
                Ok(subscription) => {
                    self.subscriptions
                        .record(streamer.id, &subscription.id, kind)
                        .await?;
                    info!(
                        streamer = %streamer.username, kind,
                        subscription_id = %subscription.id,
                        "EventSub subscription created"
                    );
                }
                Err(e) => {
                    // The streamer stays; a later resubscribe can fix it.
                    warn!(streamer = %streamer.username, kind, error = %e, "EventSub subscription failed");
                }
            }
        }

        info!(streamer = %streamer.username, id = streamer.id, "Streamer added");
        Ok(streamer)
    }

    /// Remove a broadcaster and queue deletion of its artefacts.
    pub async fn remove_streamer(&self, streamer_id: i64, delete_files: bool) -> Result<()> {
        let streamer = self.streamers.get(streamer_id).await?;

        self.orchestrator.remove_streamer(streamer_id).await;

        if delete_files {
            let streams = self
                .streams
                .recent_by_streamer(streamer_id, i64::MAX)
                .await?;
            for stream in streams {
                let task = crate::pipeline::stream_deletion_task(stream.id);
                if let Err(e) = self.queue.enqueue(vec![task]).await {
                    warn!(stream_id = stream.id, error = %e, "Failed to enqueue stream deletion");
                }
            }
        }

        if let Some(twitch) = &self.twitch {
            for subscription_id in self.subscriptions.ids_for_streamer(streamer_id).await? {
                match twitch.delete_eventsub_subscription(&subscription_id).await {
                    Ok(()) => {
                        self.subscriptions.remove(&subscription_id).await?;
                    }
                    Err(e) => {
                        warn!(
                            subscription_id = %subscription_id, error = %e,
                            "EventSub unsubscribe failed"
                        );
                    }
                }
            }
        }

        self.streamers.delete(streamer_id).await?;
        info!(streamer = %streamer.username, id = streamer_id, "Streamer removed");
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<Streamer>> {
        self.streamers.list().await
    }
}
