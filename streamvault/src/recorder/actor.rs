//! Per-streamer lifecycle actor.
//!
//! Each streamer gets one actor task owning its state machine. Inputs
//! arrive over an mpsc channel in order; capture watchers (child exit,
//! output threshold, timers) feed internal events back into the same
//! channel, tagged with the attempt they belong to so stale events from
//! a superseded capture are dropped.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use super::capture::build_capture_command;
use super::lifecycle::{LifecycleInput, LifecycleState};
use super::preflight::check_proxy_connectivity;
use crate::config::ConfigResolver;
use crate::database::repositories::{
    ProcessingRepository, RecordingRepository, RecordingUpdate, StreamEventRepository,
    StreamRepository, StreamerRepository,
};
use crate::domain::types::{RecordingStatus, StreamEventKind};
use crate::domain::Streamer;
use crate::jobs::JobQueue;
use crate::layout::{render_template, TemplateContext};
use crate::logging::ActivityLog;
use crate::supervisor::{capture_log_path, ProcessSupervisor, SpawnSpec};
use crate::ws::{Envelope, StatusBroadcaster};
use crate::{Error, Result};

/// Capture output considered "started" past this size.
const START_OUTPUT_THRESHOLD: u64 = 64 * 1024;

/// Minimum capture size worth running the pipeline on.
pub const MIN_CAPTURE_BYTES: u64 = 1024 * 1024;

/// How long Starting may run before the child is declared active anyway.
const ACTIVE_DEADLINE: Duration = Duration::from_secs(10);

/// Abort captures that produce no output within this window.
const START_TIMEOUT: Duration = Duration::from_secs(30);

/// Graceful stop budget for the capture child.
const STOP_GRACE: Duration = Duration::from_secs(30);

/// Post-stop window absorbing duplicate webhooks.
const COOLDOWN: Duration = Duration::from_secs(30);

/// Delay before the live preview snapshot is attempted.
const LIVE_PREVIEW_DELAY: Duration = Duration::from_secs(300);

/// Exit codes treated as a graceful capture end (0, or SIGINT death).
const GRACEFUL_EXIT_CODES: &[i32] = &[0, 130];

/// Shared dependencies of every streamer actor.
pub struct RecorderContext {
    pub streamers: Arc<dyn StreamerRepository>,
    pub streams: Arc<dyn StreamRepository>,
    pub recordings: Arc<dyn RecordingRepository>,
    pub events: Arc<dyn StreamEventRepository>,
    pub processing: Arc<dyn ProcessingRepository>,
    pub config: Arc<dyn ConfigResolver>,
    pub supervisor: Arc<ProcessSupervisor>,
    pub queue: Arc<JobQueue>,
    pub broadcaster: Arc<StatusBroadcaster>,
    pub activity: Arc<ActivityLog>,
    pub log_dir: PathBuf,
    /// System-wide recording slots.
    pub slots: Arc<Semaphore>,
}

/// Messages delivered to the actor task.
pub(super) enum ActorMessage {
    Input(LifecycleInput),
    Internal(InternalEvent),
    Shutdown,
}

#[derive(Debug)]
pub(super) enum InternalEvent {
    OutputThreshold { attempt: u64 },
    ActiveDeadline { attempt: u64 },
    StartTimeout { attempt: u64 },
    ChildExited { attempt: u64, code: i32 },
    CooldownElapsed { attempt: u64 },
}

struct CaptureSession {
    attempt: u64,
    stream_id: i64,
    recording_id: i64,
    capture_id: String,
    ts_path: PathBuf,
    force: bool,
    /// Whether the stop was requested (offline / operator).
    stop_requested: bool,
    offline_at: Option<DateTime<Utc>>,
    _permit: OwnedSemaphorePermit,
}

/// Snapshot of an actor's current activity, for status fan-out.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ActorStatus {
    pub streamer_id: i64,
    pub username: String,
    pub state: LifecycleState,
    pub recording_id: Option<i64>,
    pub stream_id: Option<i64>,
}

pub(super) struct StreamerActor {
    streamer: Streamer,
    ctx: Arc<RecorderContext>,
    state: LifecycleState,
    session: Option<CaptureSession>,
    attempt_counter: u64,
    self_tx: mpsc::Sender<ActorMessage>,
    status_tx: tokio::sync::watch::Sender<ActorStatus>,
}

impl StreamerActor {
    pub(super) fn spawn(
        streamer: Streamer,
        ctx: Arc<RecorderContext>,
    ) -> (
        mpsc::Sender<ActorMessage>,
        tokio::sync::watch::Receiver<ActorStatus>,
    ) {
        let (tx, mut rx) = mpsc::channel(32);
        let (status_tx, status_rx) = tokio::sync::watch::channel(ActorStatus {
            streamer_id: streamer.id,
            username: streamer.username.clone(),
            state: LifecycleState::Idle,
            recording_id: None,
            stream_id: None,
        });

        let mut actor = Self {
            streamer,
            ctx,
            state: LifecycleState::Idle,
            session: None,
            attempt_counter: 0,
            self_tx: tx.clone(),
            status_tx,
        };

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match message {
                    ActorMessage::Input(input) => actor.handle_input(input).await,
                    ActorMessage::Internal(event) => actor.handle_internal(event).await,
                    ActorMessage::Shutdown => {
                        actor.shutdown().await;
                        break;
                    }
                }
            }
        });

        (tx, status_rx)
    }

    fn set_state(&mut self, next: LifecycleState) {
        if self.state != next && !self.state.can_transition_to(next) {
            // Programmer error; the input handlers gate every edge.
            warn!(
                streamer = %self.streamer.username,
                from = %self.state, to = %next,
                "Unexpected lifecycle transition"
            );
        }
        debug!(streamer = %self.streamer.username, from = %self.state, to = %next, "Lifecycle transition");
        self.state = next;
        let _ = self.status_tx.send(ActorStatus {
            streamer_id: self.streamer.id,
            username: self.streamer.username.clone(),
            state: next,
            recording_id: self.session.as_ref().map(|s| s.recording_id),
            stream_id: self.session.as_ref().map(|s| s.stream_id),
        });
    }

    async fn handle_input(&mut self, input: LifecycleInput) {
        debug!(streamer = %self.streamer.username, input = input.name(), state = %self.state, "Lifecycle input");
        match input {
            LifecycleInput::Online(event) => {
                if self.state != LifecycleState::Idle {
                    debug!(
                        streamer = %self.streamer.username, state = %self.state,
                        "Ignoring online event outside idle"
                    );
                    return;
                }
                let started_at = event.started_at;
                let twitch_stream_id = event.id.clone();
                match self
                    .start_capture(started_at, Some(twitch_stream_id), false)
                    .await
                {
                    Ok(_) => {}
                    // Disabled streamers and full slots are already logged.
                    Err(Error::Validation(_)) => {}
                    Err(e) => {
                        warn!(streamer = %self.streamer.username, error = %e, "Failed to start capture");
                    }
                }
            }
            LifecycleInput::ForceStart { reply } => {
                let result = if self.state.is_capturing() {
                    Err(Error::RecordingAlreadyActive(self.streamer.username.clone()))
                } else if self.state == LifecycleState::Cooldown {
                    Err(Error::validation("streamer is in post-stop cooldown"))
                } else {
                    let now = Utc::now();
                    let synthetic_id = format!("force_{}", now.timestamp());
                    self.start_capture(now, Some(synthetic_id), true).await
                };
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            LifecycleInput::Offline => self.request_stop().await,
            LifecycleInput::ForceStop { reply } => {
                let result = if self.state.is_capturing() {
                    self.request_stop().await;
                    Ok(())
                } else {
                    Err(Error::validation(format!(
                        "no active recording for {}",
                        self.streamer.username
                    )))
                };
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            LifecycleInput::Update(event) => self.handle_update(event).await,
        }
    }

    async fn handle_internal(&mut self, event: InternalEvent) {
        let current_attempt = self.session.as_ref().map(|s| s.attempt);
        match event {
            InternalEvent::OutputThreshold { attempt } => {
                if current_attempt == Some(attempt) && self.state == LifecycleState::Starting {
                    self.mark_active().await;
                }
            }
            InternalEvent::ActiveDeadline { attempt } => {
                if current_attempt == Some(attempt)
                    && self.state == LifecycleState::Starting
                    && self
                        .session
                        .as_ref()
                        .map(|s| self.ctx.supervisor.is_running(&s.capture_id))
                        .unwrap_or(false)
                {
                    self.mark_active().await;
                }
            }
            InternalEvent::StartTimeout { attempt } => {
                if current_attempt == Some(attempt) && self.state == LifecycleState::Starting {
                    warn!(streamer = %self.streamer.username, "Capture produced no output; aborting");
                    if let Some(session) = &self.session {
                        let supervisor = self.ctx.supervisor.clone();
                        let capture_id = session.capture_id.clone();
                        tokio::spawn(async move {
                            supervisor.terminate(&capture_id, Duration::from_secs(5)).await;
                        });
                    }
                    self.fail_attempt("start timeout: no capture output").await;
                }
            }
            InternalEvent::ChildExited { attempt, code } => {
                if current_attempt == Some(attempt) {
                    self.handle_child_exit(code).await;
                }
            }
            InternalEvent::CooldownElapsed { attempt } => {
                if self.state == LifecycleState::Cooldown && attempt == self.attempt_counter {
                    self.set_state(LifecycleState::Idle);
                }
            }
        }
    }

    async fn handle_update(&mut self, event: crate::eventsub::payload::ChannelUpdateEvent) {
        let title = non_empty(&event.title);
        let category = non_empty(&event.category_name);
        let language = non_empty(&event.language);

        if let Err(e) = self
            .ctx
            .streamers
            .update_channel_info(self.streamer.id, title, category, language)
            .await
        {
            warn!(streamer = %self.streamer.username, error = %e, "Failed to update streamer metadata");
        }
        if let Some(t) = title {
            self.streamer.title = Some(t.to_string());
        }
        if let Some(c) = category {
            self.streamer.category_name = Some(c.to_string());
        }
        if let Some(l) = language {
            self.streamer.language = Some(l.to_string());
        }

        // While a session is open the update also becomes a chapter
        // boundary; idle updates touch only the streamer row.
        if let Some(session) = &self.session {
            if let Err(e) = self
                .ctx
                .streams
                .update_channel_info(session.stream_id, title, category, language)
                .await
            {
                warn!(stream_id = session.stream_id, error = %e, "Failed to update stream metadata");
            }
            if let Err(e) = self
                .ctx
                .events
                .append(
                    session.stream_id,
                    StreamEventKind::ChannelUpdate,
                    Utc::now(),
                    title,
                    category,
                    language,
                )
                .await
            {
                warn!(stream_id = session.stream_id, error = %e, "Failed to append channel.update event");
            }
        }
    }

    async fn start_capture(
        &mut self,
        started_at: DateTime<Utc>,
        twitch_stream_id: Option<String>,
        force: bool,
    ) -> Result<i64> {
        let config = self.ctx.config.resolve(self.streamer.id).await?;

        if !force && !config.recording_enabled {
            info!(streamer = %self.streamer.username, "Recording disabled; ignoring online event");
            return Err(Error::validation("recording disabled"));
        }

        let Ok(permit) = self.ctx.slots.clone().try_acquire_owned() else {
            warn!(
                streamer = %self.streamer.username,
                "Maximum concurrent recordings reached; rejecting start"
            );
            self.ctx.activity.record(
                &self.streamer.username,
                None,
                "start_rejected",
                "reason=max_concurrent_recordings",
            );
            return Err(Error::validation("maximum concurrent recordings reached"));
        };

        if config.proxy.is_configured() && config.proxy_preflight {
            check_proxy_connectivity(&config.proxy).await?;
        }

        let stream = self
            .ctx
            .streams
            .find_or_create_live_stream(
                self.streamer.id,
                started_at,
                twitch_stream_id.as_deref(),
                self.streamer.title.as_deref(),
                self.streamer.category_name.as_deref(),
                self.streamer.language.as_deref(),
            )
            .await?;

        self.ctx
            .events
            .append(
                stream.id,
                StreamEventKind::Online,
                started_at,
                stream.title.as_deref(),
                stream.category_name.as_deref(),
                stream.language.as_deref(),
            )
            .await?;

        let safe_name = self.streamer.safe_name();
        let rendered = render_template(
            &config.filename_template,
            &TemplateContext {
                streamer: &safe_name,
                title: stream.title.as_deref().unwrap_or("Untitled Stream"),
                game: stream.category_name.as_deref().unwrap_or(""),
                episode: stream.episode_number,
                now: started_at,
            },
        )?;
        let ts_path = config.recordings_root.join(format!("{rendered}.ts"));
        if let Some(parent) = ts_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let recording = self
            .ctx
            .recordings
            .create(
                stream.id,
                Utc::now(),
                &ts_path.to_string_lossy(),
                config.proxy.is_configured(),
            )
            .await?;
        self.ctx.processing.init(recording.id).await?;

        // The attempt is in Starting from here on; a spawn failure exits
        // through the cooldown edge like an immediate child death.
        self.set_state(LifecycleState::Starting);

        let capture_id = format!("capture-{}", recording.id);
        let command = build_capture_command(&config, &self.streamer.username, &ts_path, force);
        let log_path = capture_log_path(&self.ctx.log_dir, &safe_name, started_at);
        let spec = SpawnSpec::new(&capture_id, &command.program)
            .args(command.args.clone())
            .log_to(log_path);

        if let Err(e) = self.ctx.supervisor.spawn(spec).await {
            error!(streamer = %self.streamer.username, error = %e, "Capture spawn failed");
            self.ctx
                .recordings
                .update(
                    recording.id,
                    RecordingUpdate {
                        status: Some(RecordingStatus::Failed),
                        end_time: Some(Utc::now()),
                        ..RecordingUpdate::default()
                    },
                )
                .await?;
            self.ctx.activity.record(
                &self.streamer.username,
                Some(recording.id),
                "capture_spawn_failed",
                &format!("error={e}"),
            );
            self.enter_cooldown();
            return Err(e);
        }

        if let Err(e) = self.ctx.streamers.set_live(self.streamer.id, true).await {
            warn!(streamer = %self.streamer.username, error = %e, "Failed to set live flag");
        }
        self.streamer.is_live = true;

        self.attempt_counter += 1;
        let attempt = self.attempt_counter;
        self.session = Some(CaptureSession {
            attempt,
            stream_id: stream.id,
            recording_id: recording.id,
            capture_id: capture_id.clone(),
            ts_path: ts_path.clone(),
            force,
            stop_requested: false,
            offline_at: None,
            _permit: permit,
        });

        self.ctx.activity.record(
            &self.streamer.username,
            Some(recording.id),
            "capture_spawned",
            &format!("stream={} force={force}", stream.id),
        );

        self.spawn_watchers(attempt, capture_id, ts_path);
        Ok(recording.id)
    }

    fn spawn_watchers(&self, attempt: u64, capture_id: String, ts_path: PathBuf) {
        // Child exit watcher.
        let supervisor = self.ctx.supervisor.clone();
        let tx = self.self_tx.clone();
        let exit_capture_id = capture_id.clone();
        tokio::spawn(async move {
            let code = supervisor.wait(&exit_capture_id).await;
            let _ = tx
                .send(ActorMessage::Internal(InternalEvent::ChildExited {
                    attempt,
                    code,
                }))
                .await;
        });

        // Output threshold watcher.
        let tx = self.self_tx.clone();
        let supervisor = self.ctx.supervisor.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(500)).await;
                let size = tokio::fs::metadata(&ts_path).await.map(|m| m.len()).unwrap_or(0);
                if size >= START_OUTPUT_THRESHOLD {
                    let _ = tx
                        .send(ActorMessage::Internal(InternalEvent::OutputThreshold {
                            attempt,
                        }))
                        .await;
                    break;
                }
                if !supervisor.is_running(&capture_id) {
                    break;
                }
            }
        });

        // Starting deadlines.
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ACTIVE_DEADLINE).await;
            let _ = tx
                .send(ActorMessage::Internal(InternalEvent::ActiveDeadline { attempt }))
                .await;
        });
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(START_TIMEOUT).await;
            let _ = tx
                .send(ActorMessage::Internal(InternalEvent::StartTimeout { attempt }))
                .await;
        });
    }

    async fn mark_active(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        let recording_id = session.recording_id;
        let stream_id = session.stream_id;
        self.set_state(LifecycleState::Recording);
        info!(streamer = %self.streamer.username, recording_id, "Recording active");

        // Delayed live preview for the thumbnail step.
        let preview = crate::pipeline::live_preview_task(
            recording_id,
            stream_id,
            &self.streamer.username,
            Utc::now() + chrono::Duration::seconds(LIVE_PREVIEW_DELAY.as_secs() as i64),
        );
        if let Err(e) = self.ctx.queue.enqueue(vec![preview]).await {
            warn!(recording_id, error = %e, "Failed to schedule live preview");
        }

        self.ctx.activity.record(
            &self.streamer.username,
            Some(recording_id),
            "recording_started",
            &format!("stream={stream_id}"),
        );
        self.ctx.broadcaster.broadcast(&Envelope::recording_started(json!({
            "recording_id": recording_id,
            "stream_id": stream_id,
            "streamer_id": self.streamer.id,
            "streamer_name": self.streamer.username,
            "title": self.streamer.title,
            "category": self.streamer.category_name,
        })));
    }

    async fn request_stop(&mut self) {
        if !self.state.is_capturing() {
            // Offline without a capture still closes the live session.
            if let Ok(Some(stream)) = self.ctx.streams.find_live_by_streamer(self.streamer.id).await
            {
                let now = Utc::now();
                let _ = self.ctx.streams.end_stream(stream.id, now).await;
                let _ = self
                    .ctx
                    .events
                    .append(stream.id, StreamEventKind::Offline, now, None, None, None)
                    .await;
            }
            if self.streamer.is_live {
                let _ = self.ctx.streamers.set_live(self.streamer.id, false).await;
                self.streamer.is_live = false;
            }
            return;
        }

        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.stop_requested {
            return;
        }
        session.stop_requested = true;
        session.offline_at = Some(Utc::now());
        let stream_id = session.stream_id;
        let capture_id = session.capture_id.clone();

        let _ = self
            .ctx
            .events
            .append(stream_id, StreamEventKind::Offline, Utc::now(), None, None, None)
            .await;

        self.set_state(LifecycleState::Stopping);

        let supervisor = self.ctx.supervisor.clone();
        tokio::spawn(async move {
            let graceful = supervisor.terminate(&capture_id, STOP_GRACE).await;
            if !graceful {
                warn!(capture_id = %capture_id, "Capture child required force kill");
            }
        });
    }

    async fn handle_child_exit(&mut self, code: i32) {
        let Some(session) = &self.session else {
            return;
        };
        let graceful = session.stop_requested || GRACEFUL_EXIT_CODES.contains(&code);
        let size = tokio::fs::metadata(&session.ts_path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);

        match self.state {
            LifecycleState::Starting => {
                if size >= MIN_CAPTURE_BYTES {
                    self.finalize_capture(graceful, code, size).await;
                } else {
                    self.fail_attempt(&format!("capture exited with code {code} during start"))
                        .await;
                }
            }
            LifecycleState::Recording | LifecycleState::Stopping => {
                // Pipeline runs for graceful and errored ends alike,
                // as long as the capture produced a usable file.
                if size >= MIN_CAPTURE_BYTES {
                    self.finalize_capture(graceful, code, size).await;
                } else {
                    self.fail_attempt(&format!(
                        "capture exited with code {code} and only {size} bytes"
                    ))
                    .await;
                }
            }
            _ => {}
        }
    }

    async fn finalize_capture(&mut self, graceful: bool, exit_code: i32, size: u64) {
        let Some(session) = self.session.take() else {
            return;
        };
        let ended_at = session.offline_at.unwrap_or_else(Utc::now);

        let stream = match self.ctx.streams.end_stream(session.stream_id, ended_at).await {
            Ok(stream) => stream,
            Err(e) => {
                error!(stream_id = session.stream_id, error = %e, "Failed to end stream");
                self.enter_cooldown();
                return;
            }
        };

        let duration = (ended_at - stream.started_at).num_milliseconds() as f64 / 1000.0;
        let updated = self
            .ctx
            .recordings
            .update(
                session.recording_id,
                RecordingUpdate {
                    status: Some(RecordingStatus::Completed),
                    end_time: Some(ended_at),
                    duration_secs: Some(duration.max(0.0)),
                    ..RecordingUpdate::default()
                },
            )
            .await;
        if let Err(e) = updated {
            error!(recording_id = session.recording_id, error = %e, "Failed to complete recording");
        }

        if let Err(e) = self.ctx.streamers.set_live(self.streamer.id, false).await {
            warn!(streamer = %self.streamer.username, error = %e, "Failed to clear live flag");
        }
        self.streamer.is_live = false;

        info!(
            streamer = %self.streamer.username,
            recording_id = session.recording_id,
            graceful, exit_code, size,
            "Capture finished; enqueueing pipeline"
        );
        self.ctx.activity.record(
            &self.streamer.username,
            Some(session.recording_id),
            "recording_stopped",
            &format!("graceful={graceful} exit_code={exit_code} bytes={size}"),
        );

        let tasks = crate::pipeline::pipeline_tasks(session.recording_id, session.stream_id);
        if let Err(e) = self.ctx.queue.enqueue(tasks).await {
            error!(
                recording_id = session.recording_id, error = %e,
                "Failed to enqueue post-processing pipeline"
            );
        }

        self.ctx.broadcaster.broadcast(&Envelope::recording_stopped(json!({
            "recording_id": session.recording_id,
            "stream_id": session.stream_id,
            "streamer_id": self.streamer.id,
            "streamer_name": self.streamer.username,
            "graceful": graceful,
            "duration_secs": duration.max(0.0),
        })));

        self.ctx.supervisor.forget(&session.capture_id);
        self.enter_cooldown();
    }

    async fn fail_attempt(&mut self, reason: &str) {
        let Some(session) = self.session.take() else {
            return;
        };

        warn!(
            streamer = %self.streamer.username,
            recording_id = session.recording_id,
            reason, "Capture attempt failed"
        );

        if let Err(e) = self
            .ctx
            .recordings
            .update(
                session.recording_id,
                RecordingUpdate {
                    status: Some(RecordingStatus::Failed),
                    end_time: Some(Utc::now()),
                    ..RecordingUpdate::default()
                },
            )
            .await
        {
            error!(recording_id = session.recording_id, error = %e, "Failed to mark recording failed");
        }

        self.ctx.activity.record(
            &self.streamer.username,
            Some(session.recording_id),
            "capture_failed",
            &format!("reason={reason}"),
        );
        self.ctx.broadcaster.broadcast(&Envelope::toast(json!({
            "level": "error",
            "streamer_name": self.streamer.username,
            "message": format!("Recording failed: {reason}"),
            "recording_id": session.recording_id,
        })));

        self.ctx.supervisor.forget(&session.capture_id);
        self.enter_cooldown();
    }

    fn enter_cooldown(&mut self) {
        self.session = None;
        self.set_state(LifecycleState::Cooldown);
        let attempt = self.attempt_counter;
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(COOLDOWN).await;
            let _ = tx
                .send(ActorMessage::Internal(InternalEvent::CooldownElapsed { attempt }))
                .await;
        });
    }

    async fn shutdown(&mut self) {
        if let Some(session) = &self.session {
            info!(
                streamer = %self.streamer.username,
                recording_id = session.recording_id,
                "Shutting down with active capture"
            );
            self.ctx
                .supervisor
                .terminate(&session.capture_id, Duration::from_secs(5))
                .await;
        }
    }
}

fn non_empty(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graceful_exit_codes() {
        assert!(GRACEFUL_EXIT_CODES.contains(&0));
        // 130 = 128 + SIGINT, the supervisor's signal-death convention.
        assert!(GRACEFUL_EXIT_CODES.contains(&130));
        assert!(!GRACEFUL_EXIT_CODES.contains(&1));
    }

    #[test]
    fn test_thresholds() {
        assert_eq!(START_OUTPUT_THRESHOLD, 65_536);
        assert_eq!(MIN_CAPTURE_BYTES, 1_048_576);
        assert_eq!(STOP_GRACE, Duration::from_secs(30));
        assert_eq!(COOLDOWN, Duration::from_secs(30));
    }
}
