use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// How far a queue item has progressed through reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    /// Awaiting batch reconciliation against playback history.
    #[default]
    Pending,
    /// A play was attributed; `matched_track` holds the display title.
    Matched,
    /// An immediate now-playing check is in flight.
    Processing,
}

/// One persisted capture.  Field names are the stable document schema;
/// `createdAt` is a legacy alias accepted on read only.
///
/// Invariant: `matched_track` is non-empty exactly when `match_status` is
/// `Matched`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: Uuid,
    /// Set once at capture time; never mutated afterwards.
    #[serde(with = "queue_timestamp", alias = "createdAt")]
    pub captured_at: DateTime<Utc>,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub status: String,
    #[serde(default)]
    pub match_status: MatchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_track: Option<String>,
}

/// The last inbound deep link, kept for the status panel.  Overwritten on
/// every call; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaptureEvent {
    pub received_at: DateTime<Utc>,
    pub raw_url: String,
    pub query: HashMap<String, String>,
}

/// One normalized play from the recently-played endpoint.  Recomputed on
/// every fetch; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RecentlyPlayedItem {
    pub id: Uuid,
    pub played_at: DateTime<Utc>,
    pub track_name: String,
    pub artist_name: String,
    pub uri: String,
}

impl RecentlyPlayedItem {
    pub fn display_title(&self) -> String {
        format!("{} \u{2022} {}", self.track_name, self.artist_name)
    }
}

/// ISO-8601 codec for the queue document.  Local writes drop sub-second
/// precision; reads must also accept the fractional-second form the
/// provider uses, so old documents patched by hand or fed from API dumps
/// still load.
pub mod queue_timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_item() -> QueueItem {
        QueueItem {
            id: Uuid::new_v4(),
            captured_at: Utc.with_ymd_and_hms(2026, 1, 21, 10, 30, 0).unwrap(),
            source: "backtap".to_string(),
            platform_hint: Some("spotify".to_string()),
            note: None,
            status: "pending".to_string(),
            match_status: MatchStatus::Pending,
            matched_track: None,
        }
    }

    #[test]
    fn test_timestamp_encodes_without_fraction() {
        let json = serde_json::to_value(sample_item()).unwrap();
        assert_eq!(json["capturedAt"], "2026-01-21T10:30:00Z");
    }

    #[test]
    fn test_timestamp_decodes_fractional_seconds() {
        let json = r#"{
            "id": "7f2c1a90-0000-0000-0000-000000000001",
            "capturedAt": "2026-01-21T10:30:00.123Z",
            "source": "backtap",
            "status": "pending",
            "matchStatus": "pending"
        }"#;
        let item: QueueItem = serde_json::from_str(json).unwrap();
        assert_eq!(
            item.captured_at,
            Utc.with_ymd_and_hms(2026, 1, 21, 10, 30, 0).unwrap()
                + chrono::Duration::milliseconds(123)
        );
    }

    #[test]
    fn test_legacy_created_at_alias() {
        let json = r#"{
            "id": "7f2c1a90-0000-0000-0000-000000000002",
            "createdAt": "2026-01-21T10:30:00Z",
            "source": "shortcut",
            "status": "pending"
        }"#;
        let item: QueueItem = serde_json::from_str(json).unwrap();
        assert_eq!(
            item.captured_at,
            Utc.with_ymd_and_hms(2026, 1, 21, 10, 30, 0).unwrap()
        );
        assert_eq!(item.match_status, MatchStatus::Pending);
    }

    #[test]
    fn test_match_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&MatchStatus::Processing).unwrap(),
            "\"processing\""
        );
        assert_eq!(
            serde_json::to_string(&MatchStatus::Matched).unwrap(),
            "\"matched\""
        );
    }

    #[test]
    fn test_absent_optionals_are_omitted() {
        let json = serde_json::to_value(sample_item()).unwrap();
        assert!(json.get("note").is_none());
        assert!(json.get("matchedTrack").is_none());
    }

    #[test]
    fn test_display_title_joins_track_and_artists() {
        let play = RecentlyPlayedItem {
            id: Uuid::new_v4(),
            played_at: Utc::now(),
            track_name: "Hey Jude".to_string(),
            artist_name: "The Beatles".to_string(),
            uri: "spotify:track:abc".to_string(),
        };
        assert_eq!(play.display_title(), "Hey Jude \u{2022} The Beatles");
    }
}
