//! Recording orchestrator: one lifecycle actor per streamer.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::json;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use super::actor::{ActorMessage, ActorStatus, RecorderContext, StreamerActor};
use super::lifecycle::LifecycleInput;
use crate::domain::Streamer;
use crate::{Error, Result};

struct ActorEntry {
    tx: mpsc::Sender<ActorMessage>,
    status_rx: watch::Receiver<ActorStatus>,
}

/// Registry of per-streamer lifecycle actors.
///
/// EventSub inputs for the same streamer are serialised through the
/// actor's channel; different streamers interleave freely.
pub struct RecordingOrchestrator {
    ctx: Arc<RecorderContext>,
    actors: DashMap<i64, ActorEntry>,
}

impl RecordingOrchestrator {
    pub fn new(ctx: Arc<RecorderContext>) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            actors: DashMap::new(),
        })
    }

    /// Deliver a lifecycle input to the streamer's actor, spawning it
    /// on first use.
    pub async fn submit(&self, streamer: Streamer, input: LifecycleInput) {
        let tx = self.actor_tx(streamer);
        if tx.send(ActorMessage::Input(input)).await.is_err() {
            warn!("Lifecycle actor channel closed; dropping input");
        }
    }

    /// Operator force start; replies with the new recording id.
    pub async fn force_start(&self, streamer: Streamer) -> Result<i64> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let tx = self.actor_tx(streamer);
        tx.send(ActorMessage::Input(LifecycleInput::ForceStart {
            reply: Some(reply_tx),
        }))
        .await
        .map_err(|_| Error::Other("lifecycle actor unavailable".to_string()))?;
        reply_rx
            .await
            .map_err(|_| Error::Other("lifecycle actor dropped reply".to_string()))?
    }

    /// Operator force stop.
    pub async fn force_stop(&self, streamer: Streamer) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let tx = self.actor_tx(streamer);
        tx.send(ActorMessage::Input(LifecycleInput::ForceStop {
            reply: Some(reply_tx),
        }))
        .await
        .map_err(|_| Error::Other("lifecycle actor unavailable".to_string()))?;
        reply_rx
            .await
            .map_err(|_| Error::Other("lifecycle actor dropped reply".to_string()))?
    }

    /// Current lifecycle status per streamer with any activity.
    pub fn statuses(&self) -> Vec<ActorStatus> {
        self.actors
            .iter()
            .map(|entry| entry.value().status_rx.borrow().clone())
            .collect()
    }

    /// Active-recordings snapshot for the status broadcaster.
    pub fn active_recordings_snapshot(&self) -> serde_json::Value {
        let mut active: Vec<_> = self
            .statuses()
            .into_iter()
            .filter(|s| s.state.is_capturing())
            .map(|s| {
                json!({
                    "streamer_id": s.streamer_id,
                    "streamer_name": s.username,
                    "state": s.state,
                    "recording_id": s.recording_id,
                    "stream_id": s.stream_id,
                })
            })
            .collect();
        active.sort_by_key(|v| v["streamer_id"].as_i64());
        json!({ "active_recordings": active })
    }

    /// Whether any actor currently captures for the streamer.
    pub fn is_capturing(&self, streamer_id: i64) -> bool {
        self.actors
            .get(&streamer_id)
            .map(|entry| entry.status_rx.borrow().state.is_capturing())
            .unwrap_or(false)
    }

    /// Stop every actor, terminating in-flight captures.
    pub async fn shutdown(&self) {
        debug!(count = self.actors.len(), "Shutting down lifecycle actors");
        for entry in self.actors.iter() {
            let _ = entry.value().tx.send(ActorMessage::Shutdown).await;
        }
        self.actors.clear();
    }

    /// Drop the actor of a removed streamer.
    pub async fn remove_streamer(&self, streamer_id: i64) {
        if let Some((_, entry)) = self.actors.remove(&streamer_id) {
            let _ = entry.tx.send(ActorMessage::Shutdown).await;
        }
    }

    fn actor_tx(&self, streamer: Streamer) -> mpsc::Sender<ActorMessage> {
        if let Some(entry) = self.actors.get(&streamer.id) {
            return entry.tx.clone();
        }
        let (tx, status_rx) = StreamerActor::spawn(streamer.clone(), self.ctx.clone());
        match self.actors.entry(streamer.id) {
            dashmap::mapref::entry::Entry::Occupied(entry) => entry.get().tx.clone(),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(ActorEntry {
                    tx: tx.clone(),
                    status_rx,
                });
                tx
            }
        }
    }
}
