//! Playback-history client.
//!
//! Thin, normalized view over two provider endpoints: the recently-played
//! window (batch reconciliation input) and the currently-playing probe
//! (immediate match input).  Provider payload shapes stay private to this
//! module; the rest of the crate only sees `RecentlyPlayedItem` and
//! `NowPlaying`.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::auth::SpotifyAuth;
use crate::error::CoreError;
use crate::model::RecentlyPlayedItem;

pub const RECENTLY_PLAYED_ENDPOINT: &str =
    "https://api.spotify.com/v1/me/player/recently-played?limit=50";
pub const CURRENTLY_PLAYING_ENDPOINT: &str =
    "https://api.spotify.com/v1/me/player/currently-playing";

/// Outcome of a currently-playing probe.  `NoPlayback` (a 204) is a defined
/// outcome, not an error: nothing is playing, so there is nothing to
/// attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum NowPlaying {
    Playing(String),
    NoPlayback,
}

pub struct HistoryClient {
    http: reqwest::Client,
    auth: Arc<SpotifyAuth>,
}

impl HistoryClient {
    pub fn new(auth: Arc<SpotifyAuth>) -> Self {
        Self {
            http: reqwest::Client::new(),
            auth,
        }
    }

    /// Recently-played snapshot, normalized and ready for batch matching.
    pub async fn fetch_recently_played(&self) -> Result<Vec<RecentlyPlayedItem>, CoreError> {
        let token = self.auth.bearer_token().await?;
        let resp = self
            .http
            .get(RECENTLY_PLAYED_ENDPOINT)
            .bearer_auth(&token)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(CoreError::Decode(format!(
                "recently-played returned {}",
                resp.status()
            )));
        }
        let payload: RecentlyPlayedResponse = resp
            .json()
            .await
            .map_err(|e| CoreError::Decode(format!("recently-played payload: {}", e)))?;
        debug!("fetched {} recently played entries", payload.items.len());
        Ok(payload
            .items
            .into_iter()
            .map(PlayedEntry::normalize)
            .collect())
    }

    /// One-shot now-playing probe for the immediate match after a capture.
    pub async fn fetch_currently_playing(&self) -> Result<NowPlaying, CoreError> {
        let token = self.auth.bearer_token().await?;
        let resp = self
            .http
            .get(CURRENTLY_PLAYING_ENDPOINT)
            .bearer_auth(&token)
            .send()
            .await?;
        match resp.status() {
            reqwest::StatusCode::NO_CONTENT => Ok(NowPlaying::NoPlayback),
            reqwest::StatusCode::OK => {
                let payload: NowPlayingResponse = resp
                    .json()
                    .await
                    .map_err(|e| CoreError::Decode(format!("currently-playing payload: {}", e)))?;
                let track = payload
                    .item
                    .ok_or_else(|| CoreError::Decode("no track in response".to_string()))?;
                Ok(NowPlaying::Playing(track.display_title()))
            }
            status => Err(CoreError::Decode(format!(
                "currently-playing returned {}",
                status
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RecentlyPlayedResponse {
    items: Vec<PlayedEntry>,
}

#[derive(Debug, Deserialize)]
struct PlayedEntry {
    track: TrackPayload,
    played_at: DateTime<Utc>,
}

impl PlayedEntry {
    fn normalize(self) -> RecentlyPlayedItem {
        let artist_name = self.track.artist_names();
        RecentlyPlayedItem {
            id: Uuid::new_v4(),
            played_at: self.played_at,
            track_name: self.track.name,
            artist_name,
            uri: self.track.uri,
        }
    }
}

#[derive(Debug, Deserialize)]
struct NowPlayingResponse {
    item: Option<TrackPayload>,
}

#[derive(Debug, Deserialize)]
struct TrackPayload {
    name: String,
    uri: String,
    artists: Vec<ArtistPayload>,
}

impl TrackPayload {
    fn artist_names(&self) -> String {
        self.artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn display_title(&self) -> String {
        format!("{} \u{2022} {}", self.name, self.artist_names())
    }
}

#[derive(Debug, Deserialize)]
struct ArtistPayload {
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_recently_played_decoding() {
        let json = r#"{
            "items": [
                {
                    "track": {
                        "name": "Hey Jude",
                        "uri": "spotify:track:abc",
                        "artists": [{"name": "The Beatles"}]
                    },
                    "played_at": "2026-01-21T10:00:00.000Z"
                },
                {
                    "track": {
                        "name": "Get Lucky",
                        "uri": "spotify:track:def",
                        "artists": [{"name": "Daft Punk"}, {"name": "Pharrell Williams"}]
                    },
                    "played_at": "2026-01-21T10:04:30.500Z"
                }
            ]
        }"#;
        let payload: RecentlyPlayedResponse = serde_json::from_str(json).unwrap();
        let plays: Vec<RecentlyPlayedItem> = payload
            .items
            .into_iter()
            .map(PlayedEntry::normalize)
            .collect();
        assert_eq!(plays.len(), 2);
        assert_eq!(plays[0].track_name, "Hey Jude");
        assert_eq!(plays[0].artist_name, "The Beatles");
        assert_eq!(
            plays[0].played_at,
            Utc.with_ymd_and_hms(2026, 1, 21, 10, 0, 0).unwrap()
        );
        assert_eq!(plays[1].artist_name, "Daft Punk, Pharrell Williams");
        assert_eq!(
            plays[1].display_title(),
            "Get Lucky \u{2022} Daft Punk, Pharrell Williams"
        );
    }

    #[test]
    fn test_now_playing_decoding() {
        let json = r#"{
            "item": {
                "name": "Hey Jude",
                "uri": "spotify:track:abc",
                "artists": [{"name": "The Beatles"}]
            }
        }"#;
        let payload: NowPlayingResponse = serde_json::from_str(json).unwrap();
        let track = payload.item.unwrap();
        assert_eq!(track.display_title(), "Hey Jude \u{2022} The Beatles");
    }

    #[test]
    fn test_now_playing_without_item() {
        let payload: NowPlayingResponse = serde_json::from_str(r#"{"item": null}"#).unwrap();
        assert!(payload.item.is_none());
    }
}
