// SPDX-License-Identifier: GPL-3.0-or-later

//! Tiered exact matching against the catalog.
//!
//! The matcher returns zero or one unambiguous row; ambiguity is never
//! surfaced here. When every tier misses, the suggestion ranker takes over.

use anyhow::Result;
use std::sync::Arc;
use tracing::debug;
use tunelog_domain::{ReconciliationKey, Song};
use tunelog_infrastructure::repositories::CatalogRepository;

/// Exact-match lookup with a short-circuiting fallback chain:
/// 1. Equality on the normalized key.
/// 2. Case-insensitive literal equality on the raw strings.
/// 3. Variant-aware lookup tolerating punctuation and credit clauses.
pub struct ExactMatcher {
    catalog: Arc<dyn CatalogRepository>,
}

impl ExactMatcher {
    pub fn new(catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { catalog }
    }

    pub async fn find_exact(
        &self,
        key: &ReconciliationKey,
        title: &str,
        artist: &str,
    ) -> Result<Option<Song>> {
        if let Some(song) = self
            .catalog
            .find_by_normalized(&key.norm_title, &key.norm_artist)
            .await?
        {
            debug!(target: "matching", %key, song_id = %song.id, "normalized key hit");
            return Ok(Some(song));
        }

        if !title.trim().is_empty() && !artist.trim().is_empty() {
            if let Some(song) = self.catalog.find_by_literal_ci(title, artist).await? {
                debug!(target: "matching", %key, song_id = %song.id, "literal case-insensitive hit");
                return Ok(Some(song));
            }
        }

        if let Some(song) = self
            .catalog
            .find_by_variant(&key.norm_title, &key.norm_artist, title, artist)
            .await?
        {
            debug!(target: "matching", %key, song_id = %song.id, "variant-aware hit");
            return Ok(Some(song));
        }

        debug!(target: "matching", %key, "no exact match");
        Ok(None)
    }
}
