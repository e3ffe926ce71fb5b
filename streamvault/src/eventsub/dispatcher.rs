//! EventSub dispatcher.
//!
//! Translates verified webhook payloads into lifecycle inputs. The
//! caller acks the delivery as soon as this returns; the lifecycle work
//! itself happens asynchronously inside the streamer's actor.

use std::sync::Arc;

use tracing::{debug, info};

use super::dedup::EventDeduplicator;
use super::payload::{EventBody, WebhookPayload};
use crate::database::repositories::StreamerRepository;
use crate::recorder::{LifecycleInput, RecordingOrchestrator};
use crate::Result;

pub struct EventSubDispatcher {
    dedup: Arc<EventDeduplicator>,
    streamers: Arc<dyn StreamerRepository>,
    orchestrator: Arc<RecordingOrchestrator>,
}

impl EventSubDispatcher {
    pub fn new(
        dedup: Arc<EventDeduplicator>,
        streamers: Arc<dyn StreamerRepository>,
        orchestrator: Arc<RecordingOrchestrator>,
    ) -> Self {
        Self {
            dedup,
            streamers,
            orchestrator,
        }
    }

    /// Handle one verified notification. Always returns quickly: the
    /// delivery is acked regardless of whether it produced work.
    pub async fn dispatch(&self, message_id: &str, payload: WebhookPayload) -> Result<()> {
        let event_type = payload.subscription.kind.clone();
        let broadcaster_id = payload.broadcaster_id().unwrap_or_default();

        if self.dedup.seen(message_id, &broadcaster_id, &event_type) {
            debug!(message_id, broadcaster_id, event_type, "Duplicate delivery dropped");
            return Ok(());
        }

        let Some(streamer) = self.streamers.get_by_twitch_id(&broadcaster_id).await? else {
            debug!(broadcaster_id, event_type, "Event for unknown broadcaster dropped");
            return Ok(());
        };

        let Some(body) = payload.body()? else {
            debug!(event_type, "Unhandled subscription type");
            return Ok(());
        };

        let input = match body {
            EventBody::Online(event) => {
                info!(streamer = %streamer.username, stream_id = %event.id, "stream.online received");
                LifecycleInput::Online(event)
            }
            EventBody::Offline(_) => {
                info!(streamer = %streamer.username, "stream.offline received");
                LifecycleInput::Offline
            }
            EventBody::Update(event) => {
                debug!(streamer = %streamer.username, title = %event.title, "channel.update received");
                LifecycleInput::Update(event)
            }
        };

        self.orchestrator.submit(streamer, input).await;
        Ok(())
    }
}
