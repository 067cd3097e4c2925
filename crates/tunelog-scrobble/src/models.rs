// SPDX-License-Identifier: GPL-3.0-or-later

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level envelope of a recent-tracks response.
#[derive(Debug, Clone, Deserialize)]
pub struct RecentTracksEnvelope {
    pub recenttracks: RecentTracks,
}

/// One page of the recent-tracks stream.
#[derive(Debug, Clone, Deserialize)]
pub struct RecentTracks {
    #[serde(default)]
    pub track: Vec<PlayedTrack>,
    #[serde(rename = "@attr")]
    pub attr: RecentTracksAttr,
}

/// A single scrobble record. Now-playing entries carry no `date`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayedTrack {
    pub name: String,
    pub artist: TextField,
    #[serde(default)]
    pub date: Option<PlayedDate>,
    #[serde(rename = "@attr", default)]
    pub attr: Option<TrackAttr>,
}

impl PlayedTrack {
    /// Exact play instant, when the source recorded one.
    pub fn played_at(&self) -> Option<DateTime<Utc>> {
        let uts = self.date.as_ref()?.uts.parse::<i64>().ok()?;
        DateTime::<Utc>::from_timestamp(uts, 0)
    }

    pub fn is_now_playing(&self) -> bool {
        self.attr
            .as_ref()
            .and_then(|a| a.now_playing.as_deref())
            .map(|v| v == "true")
            .unwrap_or(false)
    }
}

/// The API wraps plain strings as `{"#text": "..."}` objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextField {
    #[serde(rename = "#text")]
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayedDate {
    pub uts: String,
    #[serde(rename = "#text", default)]
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackAttr {
    #[serde(rename = "nowplaying", default)]
    pub now_playing: Option<String>,
}

/// Pagination attributes; the API serializes every number as a string.
#[derive(Debug, Clone, Deserialize)]
pub struct RecentTracksAttr {
    #[serde(default)]
    pub user: String,
    pub page: String,
    #[serde(rename = "totalPages")]
    pub total_pages: String,
    #[serde(default)]
    pub total: String,
    #[serde(rename = "perPage", default)]
    pub per_page: String,
}

impl RecentTracksAttr {
    pub fn page_number(&self) -> Option<u32> {
        self.page.parse().ok()
    }

    pub fn total_page_count(&self) -> Option<u32> {
        self.total_pages.parse().ok()
    }
}

/// Error envelope returned with HTTP 200 on API-level failures.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub error: i64,
    pub message: String,
}

/// A decoded page handed to callers.
#[derive(Debug, Clone)]
pub struct RecentTracksPage {
    pub tracks: Vec<PlayedTrack>,
    pub page: u32,
    pub total_pages: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE_JSON: &str = r##"{
        "recenttracks": {
            "track": [
                {
                    "name": "Let Down",
                    "artist": {"#text": "Radiohead"},
                    "date": {"uts": "1590000000", "#text": "20 May 2020, 19:20"}
                },
                {
                    "name": "Spinning Plates",
                    "artist": {"#text": "Radiohead"},
                    "@attr": {"nowplaying": "true"}
                }
            ],
            "@attr": {"user": "demo", "page": "1", "perPage": "200", "totalPages": "3", "total": "512"}
        }
    }"##;

    #[test]
    fn deserializes_a_recent_tracks_page() {
        let envelope: RecentTracksEnvelope = serde_json::from_str(PAGE_JSON).unwrap();
        let page = envelope.recenttracks;

        assert_eq!(page.track.len(), 2);
        assert_eq!(page.attr.page_number(), Some(1));
        assert_eq!(page.attr.total_page_count(), Some(3));

        let dated = &page.track[0];
        assert_eq!(dated.name, "Let Down");
        assert_eq!(dated.artist.text, "Radiohead");
        assert!(dated.played_at().is_some());
        assert!(!dated.is_now_playing());
    }

    #[test]
    fn now_playing_entries_have_no_instant() {
        let envelope: RecentTracksEnvelope = serde_json::from_str(PAGE_JSON).unwrap();
        let now_playing = &envelope.recenttracks.track[1];
        assert!(now_playing.is_now_playing());
        assert!(now_playing.played_at().is_none());
    }

    #[test]
    fn played_at_converts_unix_seconds() {
        let track = PlayedTrack {
            name: "X".into(),
            artist: TextField { text: "Y".into() },
            date: Some(PlayedDate {
                uts: "0".into(),
                text: String::new(),
            }),
            attr: None,
        };
        assert_eq!(
            track.played_at().unwrap(),
            DateTime::<Utc>::from_timestamp(0, 0).unwrap()
        );
    }

    #[test]
    fn error_body_deserializes() {
        let body: ApiErrorBody =
            serde_json::from_str(r#"{"error": 6, "message": "User not found"}"#).unwrap();
        assert_eq!(body.error, 6);
    }
}
