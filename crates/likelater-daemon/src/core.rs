//! DaemonCore: single-owner event loop for all queue and token mutations.
//!
//! Every external surface (HTTP API, and the CLI behind it) sends
//! `DaemonEvent`s here instead of touching the stores directly, so
//! read-modify-write cycles on the item list never interleave.  Network
//! calls suspend the loop; state observed between events is always a
//! committed state.

use std::sync::Arc;

use likelater_core::auth::{AuthPhase, SpotifyAuth};
use likelater_core::config::Config;
use likelater_core::queue::QueueStore;
use likelater_core::reconcile::Reconciler;
use likelater_core::spotify::HistoryClient;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::browser::LoopbackPresenter;

/// All inputs into the DaemonCore loop.
#[derive(Debug)]
pub enum DaemonEvent {
    /// An inbound deep link (`capture`, `openQueue`, anything else).
    OpenUrl(String),
    /// Start the interactive Spotify authorization flow.
    Connect,
    /// Fetch recently-played history and run batch reconciliation.
    FetchHistory,
}

pub struct DaemonCore {
    config: Config,
    queue: Arc<QueueStore>,
    auth: Arc<SpotifyAuth>,
    reconciler: Reconciler,
}

impl DaemonCore {
    pub fn new(config: Config) -> Self {
        let queue = Arc::new(QueueStore::new(config.paths.queue_file.clone()));
        let auth = Arc::new(SpotifyAuth::new(config.spotify.clone()));
        let spotify = HistoryClient::new(Arc::clone(&auth));
        let reconciler = Reconciler::new(Arc::clone(&queue), spotify, Arc::clone(&auth));
        Self {
            config,
            queue,
            auth,
            reconciler,
        }
    }

    /// Borrow the queue store (for use by the HTTP server).
    pub fn queue(&self) -> Arc<QueueStore> {
        Arc::clone(&self.queue)
    }

    /// Borrow the auth store (for use by the HTTP server).
    pub fn auth(&self) -> Arc<SpotifyAuth> {
        Arc::clone(&self.auth)
    }

    /// Run the core event loop.  Returns when the event channel is closed
    /// (every surface hung up).
    pub async fn run(self, mut event_rx: mpsc::Receiver<DaemonEvent>) -> anyhow::Result<()> {
        info!("DaemonCore: starting event loop");

        loop {
            let Some(evt) = event_rx.recv().await else {
                info!("DaemonCore: event channel closed, shutting down");
                break;
            };

            match evt {
                DaemonEvent::OpenUrl(raw) => {
                    info!("DaemonCore: deep link {}", raw);
                    if let Some(id) = self.queue.handle_url(&raw).await {
                        // Immediate match: one now-playing probe while the
                        // item sits in `processing`.
                        self.reconciler.try_match_capture(id).await;
                    }
                }

                DaemonEvent::Connect => {
                    self.start_authorization().await;
                }

                DaemonEvent::FetchHistory => {
                    info!("DaemonCore: history refresh requested");
                    self.reconciler.refresh_history().await;
                }
            }
        }

        Ok(())
    }

    /// Kick off the interactive flow in a background task so captures keep
    /// flowing while the operator is busy in the browser.  Token state stays
    /// consistent because every mutation goes through SpotifyAuth's own
    /// lock, and at most one flow runs at a time.
    async fn start_authorization(&self) {
        let phase = self.auth.phase().await;
        if matches!(phase, AuthPhase::Authorizing | AuthPhase::Exchanging) {
            warn!("DaemonCore: authorization already in progress");
            return;
        }

        let auth = Arc::clone(&self.auth);
        let presenter = LoopbackPresenter::new(self.config.spotify.redirect_uri.clone());
        tokio::spawn(async move {
            if let Err(e) = auth.authorize_with(&presenter).await {
                error!("authorization flow failed: {}", e);
            }
        });
    }
}
