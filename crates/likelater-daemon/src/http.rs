//! HTTP API: the surface renderers and automation talk to.
//!
//! Mutations are forwarded to the DaemonCore loop as events; only state
//! reads go straight to the stores.

use crate::core::DaemonEvent;
use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use likelater_core::auth::{AuthPhase, SpotifyAuth};
use likelater_core::model::{CaptureEvent, QueueItem};
use likelater_core::queue::QueueStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};

#[derive(Clone)]
struct HttpState {
    queue: Arc<QueueStore>,
    auth: Arc<SpotifyAuth>,
    event_tx: mpsc::Sender<DaemonEvent>,
}

#[derive(Serialize)]
struct ApiState {
    items: Vec<QueueItem>,
    last_event: Option<CaptureEvent>,
    last_message: String,
    auth_phase: AuthPhase,
    auth_status: String,
}

#[derive(Deserialize)]
struct OpenRequest {
    url: String,
}

pub fn start_server(
    bind_address: String,
    port: u16,
    queue: Arc<QueueStore>,
    auth: Arc<SpotifyAuth>,
    event_tx: mpsc::Sender<DaemonEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app_state = HttpState {
            queue,
            auth,
            event_tx,
        };

        let app = Router::new()
            .route("/api/state", get(get_state))
            .route("/api/open", post(open_url))
            .route("/api/connect", post(connect))
            .route("/api/refresh", post(refresh_history))
            .with_state(app_state);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn get_state(State(state): State<HttpState>) -> Json<ApiState> {
    let snapshot = state.queue.snapshot().await;
    Json(ApiState {
        items: snapshot.items,
        last_event: snapshot.last_event,
        last_message: snapshot.last_message,
        auth_phase: state.auth.phase().await,
        auth_status: state.auth.last_status().await,
    })
}

async fn open_url(State(state): State<HttpState>, Json(req): Json<OpenRequest>) -> StatusCode {
    info!("HTTP API: open {}", req.url);
    if state
        .event_tx
        .send(DaemonEvent::OpenUrl(req.url))
        .await
        .is_err()
    {
        error!("Failed to send open-url event");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::OK
}

async fn connect(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: connect");
    if state.event_tx.send(DaemonEvent::Connect).await.is_err() {
        error!("Failed to send connect event");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::OK
}

async fn refresh_history(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: refresh history");
    if state.event_tx.send(DaemonEvent::FetchHistory).await.is_err() {
        error!("Failed to send fetch-history event");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::OK
}
