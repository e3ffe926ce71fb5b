//! Route handlers.

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::{debug, warn};

use super::server::AppState;
use super::signature::verify_signature;
use crate::database::repositories::StreamerRepository;
use crate::eventsub::WebhookPayload;
use crate::Error;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/eventsub/callback", post(eventsub_callback))
        .route("/ws", get(ws_upgrade))
        .route("/api/recordings/active", get(active_recordings))
        .route("/api/queue/stats", get(queue_stats))
        .route("/api/streamers", get(list_streamers).post(add_streamer))
        .route("/api/streamers/{id}", axum::routing::delete(remove_streamer))
        .route("/api/streamers/{id}/force-start", post(force_start))
        .route("/api/streamers/{id}/force-stop", post(force_stop))
        .route("/health", get(health))
        .with_state(state)
}

#[derive(serde::Deserialize)]
struct AddStreamerBody {
    login: String,
}

#[derive(serde::Deserialize, Default)]
struct RemoveStreamerQuery {
    #[serde(default)]
    delete_files: bool,
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}

/// The single inbound EventSub endpoint.
async fn eventsub_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let message_id = header(&headers, "Twitch-Eventsub-Message-Id");
    let timestamp = header(&headers, "Twitch-Eventsub-Message-Timestamp");
    let signature = header(&headers, "Twitch-Eventsub-Message-Signature");
    let message_type = header(&headers, "Twitch-Eventsub-Message-Type");

    if !verify_signature(
        &state.eventsub_secret,
        message_id,
        timestamp,
        &body,
        signature,
    ) {
        warn!(message_id, "EventSub signature verification failed");
        return (StatusCode::FORBIDDEN, "signature mismatch").into_response();
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Malformed EventSub payload");
            return (StatusCode::BAD_REQUEST, "malformed payload").into_response();
        }
    };

    match message_type {
        "webhook_callback_verification" => {
            // Echo the challenge to confirm the subscription.
            let challenge = payload.challenge.unwrap_or_default();
            (StatusCode::OK, challenge).into_response()
        }
        "notification" => {
            if let Err(e) = state.dispatcher.dispatch(message_id, payload).await {
                warn!(message_id, error = %e, "Dispatch failed");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
            StatusCode::NO_CONTENT.into_response()
        }
        "revocation" => {
            warn!(
                subscription = %payload.subscription.kind,
                "EventSub subscription revoked"
            );
            StatusCode::NO_CONTENT.into_response()
        }
        other => {
            debug!(message_type = other, "Unknown EventSub message type");
            StatusCode::NO_CONTENT.into_response()
        }
    }
}

async fn ws_upgrade(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> Response {
    upgrade.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, mut socket: WebSocket) {
    let (connection_id, mut rx) = state.broadcaster.attach();

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(text) => {
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Pings are answered by axum; client text is ignored.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.broadcaster.detach(&connection_id);
}

async fn active_recordings(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.orchestrator.active_recordings_snapshot())
}

async fn list_streamers(State(state): State<AppState>) -> Response {
    match state.streamer_manager.list().await {
        Ok(streamers) => Json(json!({ "streamers": streamers })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn add_streamer(
    State(state): State<AppState>,
    Json(body): Json<AddStreamerBody>,
) -> Response {
    match state.streamer_manager.add_streamer(&body.login).await {
        Ok(streamer) => (StatusCode::CREATED, Json(json!(streamer))).into_response(),
        Err(e) => error_response(e),
    }
}

async fn remove_streamer(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    axum::extract::Query(query): axum::extract::Query<RemoveStreamerQuery>,
) -> Response {
    match state
        .streamer_manager
        .remove_streamer(id, query.delete_files)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

async fn queue_stats(State(state): State<AppState>) -> Response {
    match state.queue.stats().await {
        Ok(stats) => Json(json!(stats)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn force_start(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    let streamer = match state.streamers.get(id).await {
        Ok(streamer) => streamer,
        Err(e) => return error_response(e),
    };
    match state.orchestrator.force_start(streamer).await {
        Ok(recording_id) => (
            StatusCode::ACCEPTED,
            Json(json!({ "recording_id": recording_id })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn force_stop(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    let streamer = match state.streamers.get(id).await {
        Ok(streamer) => streamer,
        Err(e) => return error_response(e),
    };
    match state.orchestrator.force_stop(streamer).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => error_response(e),
    }
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "ws_connections": state.broadcaster.connection_count(),
    }))
}

/// Map core errors onto client/server status codes.
fn error_response(error: Error) -> Response {
    let status = match &error {
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::RecordingAlreadyActive(_) => StatusCode::CONFLICT,
        Error::Validation(_) | Error::Configuration(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::ProxyUnreachable(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": error.to_string() }))).into_response()
}
