//! Service container for dependency injection.
//!
//! Construct at startup, tear down at shutdown. Dependencies flow
//! downward as interface-typed handles; upward signalling uses
//! channels.

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::{ApiServer, ApiServerConfig, AppState};
use crate::config::{ConfigCache, ConfigService};
use crate::database::repositories::{
    SettingsRepository, SqlxJobRepository, SqlxProcessingRepository, SqlxRecordingRepository,
    SqlxSettingsRepository, SqlxStreamEventRepository, SqlxStreamMetadataRepository,
    SqlxStreamRepository, SqlxStreamerRepository, SqlxSubscriptionRepository,
};
use crate::eventsub::{EventDeduplicator, EventSubDispatcher};
use crate::jobs::{JobQueue, TaskHandler, WorkerPool, WorkerPoolConfig};
use crate::logging::{ActivityLog, LoggingConfig};
use crate::pipeline::{self, PipelineContext};
use crate::recorder::{RecorderContext, RecordingOrchestrator};
use crate::recovery::RecoveryCoordinator;
use crate::streamer::StreamerManager;
use crate::supervisor::ProcessSupervisor;
use crate::twitch::{TwitchApiClient, TwitchAuth};
use crate::ws::StatusBroadcaster;
use crate::Result;

/// Effective-config cache TTL.
const CONFIG_CACHE_TTL: Duration = Duration::from_secs(300);

/// Graceful shutdown budget for in-flight pipeline tasks.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(120);

/// Force-kill deadline for supervised children at shutdown.
const CHILD_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

pub type AppConfigService = ConfigService<SqlxSettingsRepository, SqlxStreamerRepository>;

/// Container holding every application service.
pub struct ServiceContainer {
    pub pool: SqlitePool,
    pub config_service: Arc<AppConfigService>,
    pub supervisor: Arc<ProcessSupervisor>,
    pub queue: Arc<JobQueue>,
    pub broadcaster: Arc<StatusBroadcaster>,
    pub orchestrator: Arc<RecordingOrchestrator>,
    pub dispatcher: Arc<EventSubDispatcher>,
    pub recovery: Arc<RecoveryCoordinator>,
    pub streamer_manager: Arc<StreamerManager>,
    pub twitch: Option<Arc<TwitchApiClient>>,
    streamer_repo: Arc<SqlxStreamerRepository>,
    worker_pool: WorkerPool,
    handlers: parking_lot::Mutex<Vec<Arc<dyn TaskHandler>>>,
    api_server_config: ApiServerConfig,
    cancellation_token: CancellationToken,
}

impl ServiceContainer {
    pub async fn new(pool: SqlitePool, log_dir: std::path::PathBuf) -> Result<Arc<Self>> {
        info!("Initializing service container");

        // Repositories.
        let streamer_repo = Arc::new(SqlxStreamerRepository::new(pool.clone()));
        let stream_repo = Arc::new(SqlxStreamRepository::new(pool.clone()));
        let recording_repo = Arc::new(SqlxRecordingRepository::new(pool.clone()));
        let event_repo = Arc::new(SqlxStreamEventRepository::new(pool.clone()));
        let metadata_repo = Arc::new(SqlxStreamMetadataRepository::new(pool.clone()));
        let processing_repo = Arc::new(SqlxProcessingRepository::new(pool.clone()));
        let settings_repo = Arc::new(SqlxSettingsRepository::new(pool.clone()));
        let job_repo = Arc::new(SqlxJobRepository::new(pool.clone()));

        let global = settings_repo.global().await?;

        let config_service = Arc::new(ConfigService::with_cache(
            settings_repo.clone(),
            streamer_repo.clone(),
            ConfigCache::with_ttl(CONFIG_CACHE_TTL),
        ));

        let supervisor = Arc::new(ProcessSupervisor::new());
        let broadcaster = StatusBroadcaster::new();
        let activity = Arc::new(ActivityLog::new(&log_dir));
        let queue = JobQueue::new(job_repo);
        let orphan_check = Arc::new(Notify::new());
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        // Optional Twitch client; without credentials the reconciliation
        // probes are skipped.
        let twitch = match (
            std::env::var("TWITCH_CLIENT_ID"),
            std::env::var("TWITCH_CLIENT_SECRET"),
        ) {
            (Ok(id), Ok(secret)) if !id.is_empty() && !secret.is_empty() => {
                let auth = Arc::new(TwitchAuth::new(id, secret, http.clone()));
                Some(Arc::new(TwitchApiClient::new(auth, http.clone())))
            }
            _ => {
                warn!("TWITCH_CLIENT_ID/SECRET not set; Twitch API probes disabled");
                None
            }
        };

        // Pipeline handlers.
        let pipeline_ctx = Arc::new(PipelineContext {
            streamers: streamer_repo.clone(),
            streams: stream_repo.clone(),
            recordings: recording_repo.clone(),
            events: event_repo.clone(),
            metadata: metadata_repo.clone(),
            processing: processing_repo.clone(),
            config: config_service.clone(),
            supervisor: supervisor.clone(),
            broadcaster: broadcaster.clone(),
            activity: activity.clone(),
            log_dir: log_dir.clone(),
            http: http.clone(),
            queue: queue.clone(),
            orphan_check: orphan_check.clone(),
        });
        let handlers: Vec<Arc<dyn TaskHandler>> = vec![
            Arc::new(pipeline::remux::RemuxHandler::new(pipeline_ctx.clone())),
            Arc::new(pipeline::validate::ValidationHandler::new(pipeline_ctx.clone())),
            Arc::new(pipeline::metadata::MetadataHandler::new(pipeline_ctx.clone())),
            Arc::new(pipeline::chapters::ChaptersHandler::new(pipeline_ctx.clone())),
            Arc::new(pipeline::thumbnail::ThumbnailHandler::new(pipeline_ctx.clone())),
            Arc::new(pipeline::cleanup::CleanupHandler::new(pipeline_ctx.clone())),
            Arc::new(pipeline::cleanup::StreamDeletionHandler::new(pipeline_ctx.clone())),
            Arc::new(pipeline::preview::LivePreviewHandler::new(pipeline_ctx)),
        ];

        // Recorder.
        let recorder_ctx = Arc::new(RecorderContext {
            streamers: streamer_repo.clone(),
            streams: stream_repo.clone(),
            recordings: recording_repo.clone(),
            events: event_repo.clone(),
            processing: processing_repo.clone(),
            config: config_service.clone(),
            supervisor: supervisor.clone(),
            queue: queue.clone(),
            broadcaster: broadcaster.clone(),
            activity: activity.clone(),
            log_dir: log_dir.clone(),
            slots: Arc::new(Semaphore::new(global.max_concurrent_recordings)),
        });
        let orchestrator = RecordingOrchestrator::new(recorder_ctx);

        let dispatcher = Arc::new(EventSubDispatcher::new(
            Arc::new(EventDeduplicator::new()),
            streamer_repo.clone(),
            orchestrator.clone(),
        ));

        let recovery = RecoveryCoordinator::new(
            streamer_repo.clone(),
            stream_repo.clone(),
            recording_repo.clone(),
            queue.clone(),
            supervisor.clone(),
            twitch.clone(),
            orphan_check,
        );

        let api_server_config = ApiServerConfig::from_env_or_default();
        let callback_url = std::env::var("EVENTSUB_CALLBACK_URL").unwrap_or_default();
        let streamer_manager = Arc::new(StreamerManager::new(
            streamer_repo.clone(),
            stream_repo.clone(),
            Arc::new(SqlxSubscriptionRepository::new(pool.clone())),
            orchestrator.clone(),
            queue.clone(),
            twitch.clone(),
            callback_url,
            api_server_config.eventsub_secret.clone(),
        ));

        Ok(Arc::new(Self {
            pool,
            config_service,
            supervisor,
            queue,
            broadcaster,
            orchestrator,
            dispatcher,
            recovery,
            streamer_manager,
            twitch,
            streamer_repo,
            worker_pool: WorkerPool::new(WorkerPoolConfig::default()),
            handlers: parking_lot::Mutex::new(handlers),
            api_server_config,
            cancellation_token: CancellationToken::new(),
        }))
    }

    /// Run recovery, then start workers and periodic tasks. EventSub
    /// traffic is only accepted once this returns.
    pub async fn initialize(self: &Arc<Self>) -> Result<()> {
        self.recovery.run_startup_recovery().await?;
        self.recovery
            .start_orphan_listener(self.cancellation_token.clone());

        let handlers = self.handlers.lock().drain(..).collect();
        self.worker_pool.start(self.queue.clone(), handlers);

        pipeline::spawn_status_sync(
            self.queue.clone(),
            Arc::new(SqlxProcessingRepository::new(self.pool.clone())),
            self.broadcaster.clone(),
            self.cancellation_token.clone(),
        );

        let orchestrator = self.orchestrator.clone();
        self.broadcaster.start_snapshot_task(
            move || {
                let orchestrator = orchestrator.clone();
                async move { Some(orchestrator.active_recordings_snapshot()) }
            },
            self.cancellation_token.clone(),
        );

        info!("Service container initialized");
        Ok(())
    }

    /// Start the API server in the background.
    pub async fn start_api_server(self: &Arc<Self>) -> Result<()> {
        let state = AppState {
            dispatcher: self.dispatcher.clone(),
            orchestrator: self.orchestrator.clone(),
            broadcaster: self.broadcaster.clone(),
            queue: self.queue.clone(),
            streamers: self.streamer_repo.clone(),
            streamer_manager: self.streamer_manager.clone(),
            eventsub_secret: self.api_server_config.eventsub_secret.clone().into(),
        };
        let server = ApiServer::new(self.api_server_config.clone());
        let cancel_token = self.cancellation_token.clone();
        tokio::spawn(async move {
            if let Err(e) = server.serve(state, cancel_token).await {
                warn!(error = %e, "API server exited with error");
            }
        });
        Ok(())
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Hook the reloadable log filter to persisted settings.
    pub async fn apply_persisted_log_filter(&self, logging: &Arc<LoggingConfig>) {
        match self.config_service.global().await {
            Ok(global) if !global.log_filter_directive.is_empty() => {
                if let Err(e) = logging.set_filter(&global.log_filter_directive) {
                    warn!(error = %e, "Failed to apply persisted log filter");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to load persisted log filter"),
        }
    }

    /// Graceful shutdown: stop intake, drain workers, kill children.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down services");
        self.cancellation_token.cancel();

        self.orchestrator.shutdown().await;
        self.worker_pool.shutdown(SHUTDOWN_DEADLINE).await;
        self.supervisor.terminate_all(CHILD_SHUTDOWN_DEADLINE).await;

        info!("Shutdown complete");
        Ok(())
    }
}
