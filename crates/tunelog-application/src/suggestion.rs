// SPDX-License-Identifier: GPL-3.0-or-later

//! Fuzzy suggestion ranking for plays with no exact catalog match.
//!
//! A suggestion only ever enriches a `create` decision as a hint for human
//! review; it never changes the decided action.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use tunelog_domain::{fold_variants, ReconciliationKey, Song, SongId};
use tunelog_infrastructure::repositories::CatalogRepository;

/// Fixed confidence for an exact-title match under a differing artist
/// credit. Calibration value carried over unchanged.
const TITLE_ONLY_SCORE: f64 = 0.995;
/// Candidates scoring below this are discarded.
const FUZZY_THRESHOLD: f64 = 0.68;
/// Title collisions are rarer and more informative than artist collisions,
/// hence the asymmetric weighting.
const TITLE_WEIGHT: f64 = 0.65;
const ARTIST_WEIGHT: f64 = 0.35;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchType {
    TitleOnly,
    Fuzzy,
}

/// A candidate existing song proposed for human review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub song_id: SongId,
    pub title: String,
    pub artist: String,
    pub match_type: MatchType,
    pub score: f64,
}

pub struct SuggestionRanker {
    catalog: Arc<dyn CatalogRepository>,
}

impl SuggestionRanker {
    pub fn new(catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { catalog }
    }

    /// Propose the best candidate for a key with no exact match.
    ///
    /// An exact title match wins immediately at the fixed high-confidence
    /// score — the same song is frequently logged under slightly different
    /// artist credits. Otherwise the highest weighted-similarity candidate
    /// above the threshold is returned with a 3-decimal-rounded score.
    pub async fn suggest(&self, key: &ReconciliationKey) -> Result<Option<Suggestion>> {
        let Some(token) = search_token(key) else {
            return Ok(None);
        };
        let candidates = self.catalog.candidates_by_token(token).await?;
        if candidates.is_empty() {
            return Ok(None);
        }

        if let Some(song) = best_title_only(key, &candidates) {
            debug!(target: "suggestion", %key, song_id = %song.id, "title-only candidate");
            return Ok(Some(Suggestion {
                song_id: song.id,
                title: song.title.clone(),
                artist: song.artist.clone(),
                match_type: MatchType::TitleOnly,
                score: TITLE_ONLY_SCORE,
            }));
        }

        let best = candidates
            .iter()
            .map(|song| (song, weighted_score(key, song)))
            .max_by(|left, right| {
                left.1
                    .partial_cmp(&right.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

        match best {
            Some((song, score)) if score >= FUZZY_THRESHOLD => {
                let score = round3(score);
                debug!(target: "suggestion", %key, song_id = %song.id, score, "fuzzy candidate");
                Ok(Some(Suggestion {
                    song_id: song.id,
                    title: song.title.clone(),
                    artist: song.artist.clone(),
                    match_type: MatchType::Fuzzy,
                    score,
                }))
            }
            _ => Ok(None),
        }
    }
}

fn search_token(key: &ReconciliationKey) -> Option<&str> {
    key.norm_title
        .split_whitespace()
        .next()
        .or_else(|| key.norm_artist.split_whitespace().next())
}

/// Exact normalized-title matches, preferring the candidate whose artist
/// credit folds closest to the incoming one.
fn best_title_only<'a>(key: &ReconciliationKey, candidates: &'a [Song]) -> Option<&'a Song> {
    let folded_artist = fold_variants(&key.norm_artist);
    candidates
        .iter()
        .filter(|song| song.norm_title == key.norm_title)
        .max_by(|left, right| {
            let l = similarity(&fold_variants(&left.artist), &folded_artist);
            let r = similarity(&fold_variants(&right.artist), &folded_artist);
            l.partial_cmp(&r).unwrap_or(std::cmp::Ordering::Equal)
        })
}

fn weighted_score(key: &ReconciliationKey, song: &Song) -> f64 {
    TITLE_WEIGHT * similarity(&key.norm_title, &song.norm_title)
        + ARTIST_WEIGHT * similarity(&key.norm_artist, &song.norm_artist)
}

/// Symmetric string similarity in [0, 1]; 1.0 for identical inputs.
fn similarity(left: &str, right: &str) -> f64 {
    if left.is_empty() && right.is_empty() {
        return 1.0;
    }
    strsim::normalized_levenshtein(left, right)
}

fn round3(score: f64) -> f64 {
    (score * 1000.0).round() / 1000.0
}
