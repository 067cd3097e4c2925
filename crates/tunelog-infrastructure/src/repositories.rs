// SPDX-License-Identifier: GPL-3.0-or-later
use anyhow::Result;
use chrono::NaiveDate;
use tunelog_domain::{Song, SongId};

// ============================================================================
// Repository Traits
// ============================================================================

/// Outcome of the best-effort sequence compaction pass.
///
/// Compaction is an optimization, never a correctness requirement: gaps in
/// the sequence are legal, so an unavailable strategy reports `Skipped`
/// instead of failing the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompactionOutcome {
    Compacted { rows: u64 },
    Skipped(String),
}

/// Store boundary for the listening-log catalog.
///
/// The reconciliation core only ever talks to the catalog through this
/// trait; the concrete store (SQLite here) is an adapter detail.
#[async_trait::async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn find_by_id(&self, id: SongId) -> Result<Option<Song>>;

    /// Equality on the derived `(norm_title, norm_artist)` pair.
    async fn find_by_normalized(&self, norm_title: &str, norm_artist: &str)
        -> Result<Option<Song>>;

    /// Case-insensitive equality on the raw `(title, artist)` pair; covers
    /// rows whose normalized fields were never populated.
    async fn find_by_literal_ci(&self, title: &str, artist: &str) -> Result<Option<Song>>;

    /// Variant-aware lookup tolerating small textual differences such as
    /// punctuation or `feat.` clauses. At most one row is returned.
    async fn find_by_variant(
        &self,
        norm_title: &str,
        norm_artist: &str,
        title: &str,
        artist: &str,
    ) -> Result<Option<Song>>;

    /// Bounded candidate set for fuzzy ranking, keyed by a single token.
    async fn candidates_by_token(&self, token: &str) -> Result<Vec<Song>>;

    /// Latest-dated row with `first_listen_date <= date`, ties broken by
    /// highest sequence.
    async fn latest_dated_at_or_before(&self, date: NaiveDate) -> Result<Option<Song>>;

    async fn max_sequence(&self) -> Result<i64>;

    async fn insert(&self, song: Song) -> Result<Song>;

    async fn update(&self, song: &Song) -> Result<()>;

    /// Shift every row with `from <= sequence < below` by `delta`,
    /// processed in descending sequence order so no intermediate write
    /// collides with another live row's current value.
    async fn shift_sequences(&self, from: i64, below: i64, delta: i64) -> Result<()>;

    /// Renumber all rows to a dense 1..N sequence, best-effort.
    async fn compact_sequences(&self) -> Result<CompactionOutcome>;
}
