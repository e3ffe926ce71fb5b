//! EventSub webhook payload types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level notification payload, already signature-verified by the
/// HTTP layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub subscription: Subscription,
    #[serde(default)]
    pub event: Option<serde_json::Value>,
    /// Present only in webhook verification challenges.
    #[serde(default)]
    pub challenge: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
}

/// Typed event bodies the core reacts to.
#[derive(Debug, Clone)]
pub enum EventBody {
    Online(StreamOnlineEvent),
    Offline(StreamOfflineEvent),
    Update(ChannelUpdateEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamOnlineEvent {
    /// Twitch stream id of the new session.
    pub id: String,
    pub broadcaster_user_id: String,
    #[serde(default)]
    pub broadcaster_user_login: String,
    #[serde(default)]
    pub broadcaster_user_name: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamOfflineEvent {
    pub broadcaster_user_id: String,
    #[serde(default)]
    pub broadcaster_user_login: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelUpdateEvent {
    pub broadcaster_user_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub category_id: String,
    #[serde(default)]
    pub category_name: String,
    #[serde(default, alias = "broadcaster_language")]
    pub language: String,
}

impl WebhookPayload {
    /// Broadcaster id of the carried event, when present.
    pub fn broadcaster_id(&self) -> Option<String> {
        self.event
            .as_ref()?
            .get("broadcaster_user_id")?
            .as_str()
            .map(|s| s.to_string())
    }

    /// Parse the event body for the subscription's type. Unknown types
    /// yield `None`; malformed bodies of known types are an error.
    pub fn body(&self) -> crate::Result<Option<EventBody>> {
        let Some(event) = &self.event else {
            return Ok(None);
        };
        let body = match self.subscription.kind.as_str() {
            "stream.online" => Some(EventBody::Online(serde_json::from_value(event.clone())?)),
            "stream.offline" => Some(EventBody::Offline(serde_json::from_value(event.clone())?)),
            "channel.update" => Some(EventBody::Update(serde_json::from_value(event.clone())?)),
            _ => None,
        };
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_online_notification() {
        let payload: WebhookPayload = serde_json::from_value(json!({
            "subscription": {"id": "sub1", "type": "stream.online", "version": "1"},
            "event": {
                "id": "s42",
                "broadcaster_user_id": "111",
                "broadcaster_user_login": "alice",
                "broadcaster_user_name": "Alice",
                "started_at": "2025-01-02T10:00:00Z"
            }
        }))
        .unwrap();

        assert_eq!(payload.broadcaster_id().as_deref(), Some("111"));
        match payload.body().unwrap() {
            Some(EventBody::Online(event)) => {
                assert_eq!(event.id, "s42");
                assert_eq!(event.broadcaster_user_login, "alice");
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn test_parse_challenge() {
        let payload: WebhookPayload = serde_json::from_value(json!({
            "subscription": {"id": "sub1", "type": "stream.online", "version": "1"},
            "challenge": "pogchamp"
        }))
        .unwrap();
        assert_eq!(payload.challenge.as_deref(), Some("pogchamp"));
        assert!(payload.body().unwrap().is_none());
    }

    #[test]
    fn test_unknown_type_is_ignored() {
        let payload: WebhookPayload = serde_json::from_value(json!({
            "subscription": {"id": "sub1", "type": "channel.follow", "version": "1"},
            "event": {"broadcaster_user_id": "111"}
        }))
        .unwrap();
        assert!(payload.body().unwrap().is_none());
    }

    #[test]
    fn test_channel_update_language_alias() {
        let event: ChannelUpdateEvent = serde_json::from_value(json!({
            "broadcaster_user_id": "111",
            "title": "new title",
            "category_name": "Tetris",
            "broadcaster_language": "en"
        }))
        .unwrap();
        assert_eq!(event.language, "en");
    }
}
