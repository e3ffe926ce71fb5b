//! API server setup.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::database::repositories::StreamerRepository;
use crate::eventsub::EventSubDispatcher;
use crate::jobs::JobQueue;
use crate::recorder::RecordingOrchestrator;
use crate::streamer::StreamerManager;
use crate::ws::StatusBroadcaster;
use crate::Result;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub enable_cors: bool,
    /// Shared secret for EventSub signatures.
    pub eventsub_secret: String,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 7878,
            enable_cors: true,
            eventsub_secret: String::new(),
        }
    }
}

impl ApiServerConfig {
    /// Load from environment variables, falling back to defaults.
    ///
    /// Supported: `API_BIND_ADDRESS`, `API_PORT`, `EVENTSUB_SECRET`.
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();
        if let Ok(bind_address) = std::env::var("API_BIND_ADDRESS")
            && !bind_address.trim().is_empty()
        {
            config.bind_address = bind_address;
        }
        if let Ok(port) = std::env::var("API_PORT")
            && let Ok(parsed) = port.parse::<u16>()
        {
            config.port = parsed;
        }
        if let Ok(secret) = std::env::var("EVENTSUB_SECRET") {
            config.eventsub_secret = secret;
        }
        config
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<EventSubDispatcher>,
    pub orchestrator: Arc<RecordingOrchestrator>,
    pub broadcaster: Arc<StatusBroadcaster>,
    pub queue: Arc<JobQueue>,
    pub streamers: Arc<dyn StreamerRepository>,
    pub streamer_manager: Arc<StreamerManager>,
    pub eventsub_secret: Arc<str>,
}

pub struct ApiServer {
    config: ApiServerConfig,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig) -> Self {
        Self { config }
    }

    /// Bind and serve until the cancellation token fires.
    pub async fn serve(&self, state: AppState, cancel_token: CancellationToken) -> Result<()> {
        let mut router: Router = super::routes::router(state);
        router = router.layer(TraceLayer::new_for_http());
        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        let address: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| crate::Error::config(format!("invalid bind address: {e}")))?;
        let listener = TcpListener::bind(address).await?;
        info!(%address, "API server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(async move { cancel_token.cancelled().await })
            .await?;
        Ok(())
    }
}
