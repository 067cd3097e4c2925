// SPDX-License-Identifier: GPL-3.0-or-later

//! Adapts the external play-history source into incoming plays.

use chrono::{DateTime, Utc};
use tracing::info;
use tunelog_domain::IncomingPlay;
use tunelog_scrobble::{PlayedTrack, ScrobbleClient};

use crate::batch::ReconcileError;

/// Which slice of a user's history to fetch.
#[derive(Debug, Clone)]
pub struct SyncCriteria {
    pub user: String,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Paginated, rate-limited fetch of a user's play history.
///
/// Any transport or API error aborts the whole fetch; no partial batch is
/// ever handed to reconciliation.
pub struct PlayHistorySource {
    client: ScrobbleClient,
}

impl PlayHistorySource {
    pub fn new(client: ScrobbleClient) -> Self {
        Self { client }
    }

    pub async fn fetch(&self, criteria: &SyncCriteria) -> Result<Vec<IncomingPlay>, ReconcileError> {
        if criteria.user.trim().is_empty() {
            return Err(ReconcileError::MissingCriteria("user".into()));
        }

        let tracks = self
            .client
            .fetch_all_plays(
                &criteria.user,
                criteria.from.map(|t| t.timestamp()),
                criteria.to.map(|t| t.timestamp()),
            )
            .await?;

        info!(
            target: "scrobble",
            user = %criteria.user,
            plays = tracks.len(),
            "fetched play history"
        );

        Ok(tracks.into_iter().map(to_incoming_play).collect())
    }
}

fn to_incoming_play(track: PlayedTrack) -> IncomingPlay {
    let played_at = track.played_at();
    IncomingPlay {
        title: track.name,
        artist: track.artist.text,
        date: played_at.map(|t| t.date_naive()),
        played_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tunelog_scrobble::models::{PlayedDate, TextField};

    #[test]
    fn dated_track_converts_to_dated_play() {
        let track = PlayedTrack {
            name: "Let Down".into(),
            artist: TextField {
                text: "Radiohead".into(),
            },
            date: Some(PlayedDate {
                uts: "1590000000".into(),
                text: String::new(),
            }),
            attr: None,
        };

        let play = to_incoming_play(track);
        assert_eq!(play.title, "Let Down");
        assert!(play.is_dated());
        assert!(play.played_at.is_some());
    }

    #[test]
    fn now_playing_track_converts_to_undated_play() {
        let track = PlayedTrack {
            name: "Live Now".into(),
            artist: TextField { text: "B".into() },
            date: None,
            attr: None,
        };

        let play = to_incoming_play(track);
        assert!(!play.is_dated());
        assert!(play.played_at.is_none());
    }
}
