//! Inbound deep-link parsing.
//!
//! Links arrive as `likelater://<action>[?key=value&...]`.  The action is
//! the URI host when present, otherwise the path with surrounding slashes
//! trimmed.  Query parameters collapse into a plain map, last value winning
//! on duplicate names, a missing value decoding as the empty string.

use chrono::{DateTime, Utc};
use url::Url;

use crate::model::{MatchStatus, QueueItem};
use std::collections::HashMap;
use uuid::Uuid;

/// A decoded deep link: the requested action plus its query mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct DeepLink {
    pub action: String,
    pub query: HashMap<String, String>,
}

/// The fields a `capture` link contributes to a new queue item.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    pub source: String,
    pub platform_hint: Option<String>,
    pub note: Option<String>,
}

pub fn parse(raw: &str) -> Result<DeepLink, url::ParseError> {
    let url = Url::parse(raw)?;

    let action = match url.host_str() {
        Some(host) if !host.is_empty() => host.to_string(),
        _ => url.path().trim_matches('/').to_string(),
    };

    let mut query = HashMap::new();
    for (name, value) in url.query_pairs() {
        query.insert(name.into_owned(), value.into_owned());
    }

    Ok(DeepLink { action, query })
}

impl DeepLink {
    /// Pull the capture fields out of the query mapping.  `source` falls
    /// back to "unknown"; the platform hint takes `app` over `platform`.
    pub fn capture_request(&self) -> CaptureRequest {
        CaptureRequest {
            source: self
                .query
                .get("source")
                .cloned()
                .unwrap_or_else(|| "unknown".to_string()),
            platform_hint: self
                .query
                .get("app")
                .or_else(|| self.query.get("platform"))
                .cloned(),
            note: self.query.get("note").cloned(),
        }
    }
}

impl CaptureRequest {
    /// Mint the queue item for this capture.  New items start in
    /// `Processing` so the immediate now-playing check can claim them.
    pub fn into_item(self, captured_at: DateTime<Utc>) -> QueueItem {
        QueueItem {
            id: Uuid::new_v4(),
            captured_at,
            source: self.source,
            platform_hint: self.platform_hint,
            note: self.note,
            status: "pending".to_string(),
            match_status: MatchStatus::Processing,
            matched_track: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_action_with_query() {
        let link = parse("likelater://capture?source=backtap&app=spotify").unwrap();
        assert_eq!(link.action, "capture");
        assert_eq!(link.query.get("source").unwrap(), "backtap");
        assert_eq!(link.query.get("app").unwrap(), "spotify");
    }

    #[test]
    fn test_action_from_path_when_host_empty() {
        let link = parse("likelater:///openQueue").unwrap();
        assert_eq!(link.action, "openQueue");
        assert!(link.query.is_empty());
    }

    #[test]
    fn test_empty_action() {
        let link = parse("likelater:///").unwrap();
        assert_eq!(link.action, "");
    }

    #[test]
    fn test_duplicate_keys_last_wins() {
        let link = parse("likelater://capture?source=a&source=b").unwrap();
        assert_eq!(link.query.get("source").unwrap(), "b");
    }

    #[test]
    fn test_missing_value_is_empty_string() {
        let link = parse("likelater://capture?note").unwrap();
        assert_eq!(link.query.get("note").unwrap(), "");
    }

    #[test]
    fn test_capture_request_defaults() {
        let link = parse("likelater://capture").unwrap();
        let request = link.capture_request();
        assert_eq!(request.source, "unknown");
        assert!(request.platform_hint.is_none());
        assert!(request.note.is_none());
    }

    #[test]
    fn test_capture_request_prefers_app_over_platform() {
        let link = parse("likelater://capture?app=spotify&platform=tidal").unwrap();
        assert_eq!(link.capture_request().platform_hint.as_deref(), Some("spotify"));
    }

    #[test]
    fn test_capture_request_falls_back_to_platform() {
        let link = parse("likelater://capture?platform=tidal").unwrap();
        assert_eq!(link.capture_request().platform_hint.as_deref(), Some("tidal"));
    }

    #[test]
    fn test_into_item_starts_processing() {
        let link = parse("likelater://capture?source=backtap&note=check+this").unwrap();
        let item = link.capture_request().into_item(Utc::now());
        assert_eq!(item.source, "backtap");
        assert_eq!(item.note.as_deref(), Some("check this"));
        assert_eq!(item.status, "pending");
        assert_eq!(item.match_status, MatchStatus::Processing);
        assert!(item.matched_track.is_none());
    }
}
