//! Coalesced WebSocket fan-out.
//!
//! Connections are registered with a stable id, so duplicate tabs from
//! the same client count separately. Sends are non-blocking per
//! connection; a connection whose channel is gone or full is dropped
//! and closed rather than slowing the rest.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::envelope::Envelope;

/// Debounce window for per-recording processing deltas.
const DELTA_DEBOUNCE: Duration = Duration::from_millis(150);

/// Outbound channel depth per connection. Slow clients hitting this
/// bound are dropped.
const CONNECTION_BUFFER: usize = 64;

struct Connection {
    tx: mpsc::Sender<String>,
}

/// Fan-out hub for status envelopes.
pub struct StatusBroadcaster {
    connections: DashMap<String, Connection>,
    /// Latest pending processing delta per recording id.
    pending_deltas: Arc<DashMap<i64, Value>>,
    /// JSON of the last active-recordings snapshot actually sent.
    last_snapshot: parking_lot::Mutex<Option<String>>,
}

impl StatusBroadcaster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connections: DashMap::new(),
            pending_deltas: Arc::new(DashMap::new()),
            last_snapshot: parking_lot::Mutex::new(None),
        })
    }

    /// Register a connection; the caller forwards the receiver to the
    /// socket. A `connection.status` greeting is queued immediately.
    pub fn attach(&self) -> (String, mpsc::Receiver<String>) {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(CONNECTION_BUFFER);

        let greeting = Envelope::connection_status(serde_json::json!({
            "connection_id": id,
            "status": "connected",
        }));
        if let Ok(text) = serde_json::to_string(&greeting) {
            let _ = tx.try_send(text);
        }

        self.connections.insert(id.clone(), Connection { tx });
        info!(connection_id = %id, total = self.connections.len(), "WebSocket client attached");
        (id, rx)
    }

    pub fn detach(&self, id: &str) {
        if self.connections.remove(id).is_some() {
            info!(connection_id = %id, total = self.connections.len(), "WebSocket client detached");
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Send an envelope to every connection, dropping dead ones.
    pub fn broadcast(&self, envelope: &Envelope) {
        let Ok(text) = serde_json::to_string(envelope) else {
            warn!(kind = %envelope.kind, "Failed to serialize envelope");
            return;
        };

        let mut dead = Vec::new();
        for entry in self.connections.iter() {
            if entry.value().tx.try_send(text.clone()).is_err() {
                dead.push(entry.key().clone());
            }
        }
        for id in dead {
            warn!(connection_id = %id, "Dropping unresponsive WebSocket client");
            self.connections.remove(&id);
        }
    }

    /// Queue a per-recording processing delta, debounced by 150 ms per
    /// recording id; within the window the last delta wins.
    pub fn broadcast_processing_delta(self: &Arc<Self>, recording_id: i64, data: Value) {
        let scheduled = self.pending_deltas.insert(recording_id, data).is_some();
        if scheduled {
            return;
        }

        let broadcaster = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(DELTA_DEBOUNCE).await;
            if let Some((_, data)) = broadcaster.pending_deltas.remove(&recording_id) {
                broadcaster.broadcast(&Envelope::recording_processing_status(data));
            }
        });
    }

    /// Send the active-recordings snapshot unless unchanged since the
    /// last send.
    pub fn send_active_recordings_snapshot(&self, data: Value) {
        let serialized = data.to_string();
        {
            let mut last = self.last_snapshot.lock();
            if last.as_deref() == Some(serialized.as_str()) {
                debug!("Active recordings unchanged; skipping snapshot");
                return;
            }
            *last = Some(serialized);
        }
        self.broadcast(&Envelope::active_recordings_update(data));
    }

    /// Periodic snapshot task, every 10 s until cancelled.
    pub fn start_snapshot_task<F, Fut>(
        self: &Arc<Self>,
        provider: F,
        cancel_token: CancellationToken,
    ) where
        F: Fn() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Option<Value>> + Send,
    {
        let broadcaster = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(10));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Snapshot task shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        if let Some(data) = provider().await {
                            broadcaster.send_active_recordings_snapshot(data);
                        }
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_attach_greeting_and_broadcast() {
        let broadcaster = StatusBroadcaster::new();
        let (_id, mut rx) = broadcaster.attach();

        let greeting = rx.recv().await.unwrap();
        assert!(greeting.contains("connection.status"));

        broadcaster.broadcast(&Envelope::recording_started(json!({"recording_id": 1})));
        let message = rx.recv().await.unwrap();
        assert!(message.contains("recording_started"));
    }

    #[tokio::test]
    async fn test_duplicate_tabs_counted_separately() {
        let broadcaster = StatusBroadcaster::new();
        let (a, _rx_a) = broadcaster.attach();
        let (b, _rx_b) = broadcaster.attach();
        assert_ne!(a, b);
        assert_eq!(broadcaster.connection_count(), 2);
    }

    #[tokio::test]
    async fn test_dead_connection_dropped() {
        let broadcaster = StatusBroadcaster::new();
        let (_id, rx) = broadcaster.attach();
        drop(rx);
        broadcaster.broadcast(&Envelope::recording_stopped(json!({})));
        assert_eq!(broadcaster.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_delta_debounce_last_wins() {
        let broadcaster = StatusBroadcaster::new();
        let (_id, mut rx) = broadcaster.attach();
        let _greeting = rx.recv().await.unwrap();

        broadcaster.broadcast_processing_delta(3, json!({"step": "mp4_remux", "v": 1}));
        broadcaster.broadcast_processing_delta(3, json!({"step": "mp4_remux", "v": 2}));

        let message = tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(message.contains("\"v\":2"));
        // Only one delta is sent for the window.
        assert!(
            tokio::time::timeout(Duration::from_millis(200), rx.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_snapshot_skipped_when_unchanged() {
        let broadcaster = StatusBroadcaster::new();
        let (_id, mut rx) = broadcaster.attach();
        let _greeting = rx.recv().await.unwrap();

        broadcaster.send_active_recordings_snapshot(json!({"active": []}));
        assert!(rx.recv().await.unwrap().contains("active_recordings_update"));

        broadcaster.send_active_recordings_snapshot(json!({"active": []}));
        assert!(
            tokio::time::timeout(Duration::from_millis(100), rx.recv())
                .await
                .is_err()
        );
    }
}
