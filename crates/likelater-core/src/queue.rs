//! The capture queue: the single source of truth the UI renders.
//!
//! Owns the ordered item list and its on-disk document.  All mutating
//! operations run behind one lock and persist synchronously, so a snapshot
//! taken between operations is always a committed state.  Subscribers get a
//! broadcast ping after every committed mutation.

use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::capture;
use crate::model::{CaptureEvent, MatchStatus, QueueItem, RecentlyPlayedItem};
use crate::reconcile;

/// Fired after every committed mutation.  Receivers re-read via `snapshot`.
#[derive(Debug, Clone)]
pub enum QueueUpdate {
    Changed,
}

/// Everything the queue publishes to renderers.
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub items: Vec<QueueItem>,
    pub last_event: Option<CaptureEvent>,
    pub last_message: String,
}

struct QueueInner {
    items: Vec<QueueItem>,
    last_event: Option<CaptureEvent>,
    last_message: String,
}

pub struct QueueStore {
    inner: Arc<RwLock<QueueInner>>,
    queue_file: PathBuf,
    update_tx: broadcast::Sender<QueueUpdate>,
}

impl QueueStore {
    /// Load is tolerant: a missing document starts an empty queue, a
    /// corrupt one starts empty with a "failed to load" status instead of
    /// refusing to come up.
    pub fn new(queue_file: PathBuf) -> Self {
        let (items, last_message) = Self::load_items(&queue_file);
        let (update_tx, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(RwLock::new(QueueInner {
                items,
                last_event: None,
                last_message,
            })),
            queue_file,
            update_tx,
        }
    }

    fn load_items(path: &Path) -> (Vec<QueueItem>, String) {
        if !path.exists() {
            return (Vec::new(), "Ready to capture.".to_string());
        }
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!("queue document unreadable: {}", e);
                return (Vec::new(), "Failed to load queue.".to_string());
            }
        };
        match serde_json::from_str::<Vec<QueueItem>>(&content) {
            Ok(items) => {
                info!("loaded {} queued item(s) from {:?}", items.len(), path);
                (items, "Ready to capture.".to_string())
            }
            Err(e) => {
                warn!("queue document decode failed: {}", e);
                (Vec::new(), "Failed to load queue.".to_string())
            }
        }
    }

    /// Entry point for inbound deep links.  Records a `CaptureEvent` no
    /// matter the action; only `capture` mutates the queue.  Returns the new
    /// item's id so the caller can kick off the immediate now-playing check.
    pub async fn handle_url(&self, raw: &str) -> Option<Uuid> {
        let received_at = Utc::now();
        let link = match capture::parse(raw) {
            Ok(link) => link,
            Err(e) => {
                warn!("unparseable deep link {:?}: {}", raw, e);
                let mut inner = self.inner.write().await;
                inner.last_event = Some(CaptureEvent {
                    received_at,
                    raw_url: raw.to_string(),
                    query: HashMap::new(),
                });
                inner.last_message = "Could not parse URL.".to_string();
                drop(inner);
                self.notify();
                return None;
            }
        };

        let mut inner = self.inner.write().await;
        inner.last_event = Some(CaptureEvent {
            received_at,
            raw_url: raw.to_string(),
            query: link.query.clone(),
        });

        let id = match link.action.as_str() {
            "capture" => {
                let item = link.capture_request().into_item(received_at);
                let id = item.id;
                inner.items.insert(0, item);
                inner.last_message = "Added to queue.".to_string();
                self.save_locked(&mut inner).await;
                Some(id)
            }
            "openQueue" => {
                inner.last_message = "Opened queue.".to_string();
                None
            }
            "" => {
                inner.last_message = "No action found in URL.".to_string();
                None
            }
            other => {
                info!("unrecognized deep-link action: {}", other);
                inner.last_message = format!("Unknown action: {}", other);
                None
            }
        };

        drop(inner);
        self.notify();
        id
    }

    /// Prepend a new capture.  Most recent first.
    pub async fn insert(&self, item: QueueItem) {
        let mut inner = self.inner.write().await;
        inner.items.insert(0, item);
        self.save_locked(&mut inner).await;
        drop(inner);
        self.notify();
    }

    /// Commit the outcome of an immediate now-playing check.  An empty or
    /// absent title drops the item back to `Pending` so batch
    /// reconciliation can pick it up later; that is a deferral, not a
    /// failure.  Unknown ids are a no-op.
    pub async fn apply_match_result(&self, id: Uuid, matched_track: Option<&str>) {
        let mut inner = self.inner.write().await;
        {
            let Some(item) = inner.items.iter_mut().find(|i| i.id == id) else {
                return;
            };
            match matched_track {
                Some(title) if !title.is_empty() => {
                    item.match_status = MatchStatus::Matched;
                    item.matched_track = Some(title.to_string());
                }
                _ => {
                    item.match_status = MatchStatus::Pending;
                    item.matched_track = None;
                }
            }
        }
        self.save_locked(&mut inner).await;
        drop(inner);
        self.notify();
    }

    /// Delete by id.  No-op when absent.
    pub async fn remove(&self, id: Uuid) {
        let mut inner = self.inner.write().await;
        let before = inner.items.len();
        inner.items.retain(|i| i.id != id);
        if inner.items.len() == before {
            return;
        }
        self.save_locked(&mut inner).await;
        drop(inner);
        self.notify();
    }

    /// Bulk reconciliation after a history fetch.  Persists once for the
    /// whole batch; an empty play list is a no-op that never touches disk.
    pub async fn apply_recent_plays(&self, plays: &[RecentlyPlayedItem]) {
        if plays.is_empty() {
            return;
        }
        let mut sorted = plays.to_vec();
        sorted.sort_by_key(|p| p.played_at);

        let mut inner = self.inner.write().await;
        let matched = reconcile::match_pending(&mut inner.items, &sorted);
        if matched > 0 {
            info!("batch reconciliation matched {} item(s)", matched);
        }
        self.save_locked(&mut inner).await;
        drop(inner);
        self.notify();
    }

    pub async fn snapshot(&self) -> QueueSnapshot {
        let inner = self.inner.read().await;
        QueueSnapshot {
            items: inner.items.clone(),
            last_event: inner.last_event.clone(),
            last_message: inner.last_message.clone(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueUpdate> {
        self.update_tx.subscribe()
    }

    fn notify(&self) {
        // No receivers is fine; the daemon may run headless.
        let _ = self.update_tx.send(QueueUpdate::Changed);
    }

    /// Serialize the full ordered list; write to a sibling temp file and
    /// rename over the document so a crash can never leave it truncated.
    /// A failed save keeps the in-memory state ahead of disk and surfaces a
    /// status message; the next successful save reconciles.
    async fn save_locked(&self, inner: &mut QueueInner) {
        if let Err(e) = self.write_document(&inner.items).await {
            warn!("queue save failed: {}", e);
            inner.last_message = "Failed to save queue.".to_string();
        }
    }

    async fn write_document(&self, items: &[QueueItem]) -> anyhow::Result<()> {
        if let Some(parent) = self.queue_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(items)?;
        let tmp = self.queue_file.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.queue_file).await?;
        Ok(())
    }
}
