//! Reconciliation engine: attaches played tracks to queued captures.
//!
//! The policy is "the capture most likely refers to whatever was playing at
//! or just before the moment of capture".  Two modes feed it: an immediate
//! now-playing probe right after a capture, and a batch pass over the
//! recently-played window.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::auth::SpotifyAuth;
use crate::model::{MatchStatus, QueueItem, RecentlyPlayedItem};
use crate::queue::QueueStore;
use crate::spotify::{HistoryClient, NowPlaying};

/// Latest play at or before `target`.
///
/// Order-robust on purpose: provider timestamps are only as sorted as the
/// caller makes them, so this keeps the maximum qualifying play instead of
/// early-breaking at the first play past the target.
pub fn latest_play_at_or_before(
    plays: &[RecentlyPlayedItem],
    target: DateTime<Utc>,
) -> Option<&RecentlyPlayedItem> {
    plays
        .iter()
        .filter(|p| p.played_at <= target)
        .max_by_key(|p| p.played_at)
}

/// Match every strictly-pending item against the play list.  Items already
/// matched or mid-immediate-check are skipped; items with no qualifying
/// play stay pending (batch mode never deletes).  Returns how many items
/// were newly matched.
pub fn match_pending(items: &mut [QueueItem], plays: &[RecentlyPlayedItem]) -> usize {
    let mut matched = 0;
    for item in items.iter_mut() {
        if item.match_status != MatchStatus::Pending {
            continue;
        }
        if let Some(play) = latest_play_at_or_before(plays, item.captured_at) {
            item.match_status = MatchStatus::Matched;
            item.matched_track = Some(play.display_title());
            matched += 1;
        }
    }
    matched
}

/// Couples the capture queue to the playback-history client.
pub struct Reconciler {
    queue: Arc<QueueStore>,
    spotify: HistoryClient,
    auth: Arc<SpotifyAuth>,
}

impl Reconciler {
    pub fn new(queue: Arc<QueueStore>, spotify: HistoryClient, auth: Arc<SpotifyAuth>) -> Self {
        Self {
            queue,
            spotify,
            auth,
        }
    }

    /// Immediate match: one now-playing probe right after a capture.
    /// Playing -> matched; an explicit no-playback signal -> the capture is
    /// removed, since there is nothing to attribute; any failure -> back to
    /// pending for the next batch pass.
    pub async fn try_match_capture(&self, id: Uuid) {
        match self.spotify.fetch_currently_playing().await {
            Ok(outcome) => self.apply_now_playing(id, outcome).await,
            Err(e) => {
                warn!("now-playing check failed, leaving capture pending: {}", e);
                self.queue.apply_match_result(id, None).await;
            }
        }
    }

    /// Apply a now-playing outcome to a queued capture.
    pub async fn apply_now_playing(&self, id: Uuid, outcome: NowPlaying) {
        match outcome {
            NowPlaying::Playing(title) => {
                self.queue.apply_match_result(id, Some(&title)).await;
                self.auth.set_status("Matched with currently playing.").await;
            }
            NowPlaying::NoPlayback => {
                self.queue.remove(id).await;
                self.auth.set_status("Removed capture (no playback).").await;
            }
        }
    }

    /// Batch match: pull the recently-played window and reconcile every
    /// pending item in one pass.
    pub async fn refresh_history(&self) {
        match self.spotify.fetch_recently_played().await {
            Ok(plays) => {
                let count = plays.len();
                self.queue.apply_recent_plays(&plays).await;
                self.auth
                    .set_status(format!("Fetched {} recently played items.", count))
                    .await;
            }
            // bearer_token already set the "connect first" status.
            Err(crate::error::CoreError::NotConnected) => {}
            Err(e) => {
                warn!("recently-played fetch failed: {}", e);
                self.auth
                    .set_status("Failed to fetch recently played.")
                    .await;
            }
        }
    }
}
