// SPDX-License-Identifier: GPL-3.0-or-later
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Value Objects & IDs
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SongId(pub Uuid);

impl SongId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SongId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SongId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Normalization
// ============================================================================

/// Produce the comparison form of a title or artist string.
///
/// Applied identically to incoming plays and stored catalog rows so keys
/// stay comparable. ASCII-oriented case folding only; no locale-aware
/// folding is attempted.
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Variant-tolerant folding for near-miss comparisons.
///
/// Cuts trailing `feat.`/`ft.` credit clauses, drops punctuation, and
/// collapses whitespace, so "Song (feat. Guest)" folds to "song".
pub fn fold_variants(text: &str) -> String {
    let lower = text.to_lowercase();
    let mut cut = lower.as_str();
    for marker in ["(feat", "[feat", "(ft.", "[ft.", " feat. ", " feat ", " ft. ", " featuring "] {
        if let Some(idx) = cut.find(marker) {
            cut = &cut[..idx];
        }
    }
    cut.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// The unit of de-duplication: all plays sharing a key are listens of the
/// same song.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReconciliationKey {
    pub norm_title: String,
    pub norm_artist: String,
}

impl ReconciliationKey {
    pub fn new(title: &str, artist: &str) -> Self {
        Self {
            norm_title: normalize(title),
            norm_artist: normalize(artist),
        }
    }
}

impl std::fmt::Display for ReconciliationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} / {}", self.norm_title, self.norm_artist)
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A catalog row. `sequence` is a positive integer defining the strict
/// total order of first listens; values are unique at rest, with transient
/// duplication allowed only mid-shift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Song {
    pub id: SongId,
    pub title: String,
    pub artist: String,
    pub norm_title: String,
    pub norm_artist: String,
    pub first_listen_date: Option<NaiveDate>,
    pub first_listen_at: Option<DateTime<Utc>>,
    pub sequence: i64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Song {
    pub fn new(title: impl Into<String>, artist: impl Into<String>, sequence: i64) -> Self {
        let title = title.into();
        let artist = artist.into();
        let now = Utc::now();
        Self {
            norm_title: normalize(&title),
            norm_artist: normalize(&artist),
            id: SongId::new(),
            title,
            artist,
            first_listen_date: None,
            first_listen_at: None,
            sequence,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> ReconciliationKey {
        ReconciliationKey {
            norm_title: self.norm_title.clone(),
            norm_artist: self.norm_artist.clone(),
        }
    }
}

/// One timestamped record of a track being played, as received from an
/// external play-history source. Plays without a calendar date are
/// discarded before reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingPlay {
    pub title: String,
    pub artist: String,
    pub date: Option<NaiveDate>,
    pub played_at: Option<DateTime<Utc>>,
}

impl IncomingPlay {
    pub fn key(&self) -> ReconciliationKey {
        ReconciliationKey::new(&self.title, &self.artist)
    }

    pub fn is_dated(&self) -> bool {
        self.date.is_some()
    }
}

// ============================================================================
// Domain Validation
// ============================================================================

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

pub trait Validate {
    fn validate(&self) -> Result<(), Vec<ValidationError>>;
}

impl Validate for Song {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        if self.title.trim().is_empty() {
            errors.push(ValidationError {
                field: "title",
                message: "title cannot be empty".into(),
            });
        }
        if self.artist.trim().is_empty() {
            errors.push(ValidationError {
                field: "artist",
                message: "artist cannot be empty".into(),
            });
        }
        if self.sequence < 1 {
            errors.push(ValidationError {
                field: "sequence",
                message: "sequence must be >= 1".into(),
            });
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
