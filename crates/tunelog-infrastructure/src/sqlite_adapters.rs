// SPDX-License-Identifier: GPL-3.0-or-later
use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::Row;
use sqlx::SqlitePool;
use tracing::{debug, warn};
use tunelog_domain::{fold_variants, Song, SongId};
use uuid::Uuid;

use crate::repositories::{CatalogRepository, CompactionOutcome};

/// Upper bound on fuzzy candidate fetches.
const CANDIDATE_LIMIT: i64 = 50;

/// SQLx-backed catalog repository.
pub struct SqliteCatalogRepository {
    pool: SqlitePool,
}

impl SqliteCatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CatalogRepository for SqliteCatalogRepository {
    async fn find_by_id(&self, id: SongId) -> Result<Option<Song>> {
        debug!(target: "repository", song_id = %id, "fetching song by id");
        let row = sqlx::query("SELECT * FROM songs WHERE id = ? LIMIT 1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_song(&r)).transpose()
    }

    async fn find_by_normalized(
        &self,
        norm_title: &str,
        norm_artist: &str,
    ) -> Result<Option<Song>> {
        debug!(target: "repository", norm_title, norm_artist, "lookup by normalized key");
        let row = sqlx::query(
            "SELECT * FROM songs WHERE norm_title = ? AND norm_artist = ? ORDER BY sequence LIMIT 1",
        )
        .bind(norm_title)
        .bind(norm_artist)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| row_to_song(&r)).transpose()
    }

    async fn find_by_literal_ci(&self, title: &str, artist: &str) -> Result<Option<Song>> {
        debug!(target: "repository", title, artist, "lookup by case-insensitive literal");
        let row = sqlx::query(
            "SELECT * FROM songs WHERE title = ? COLLATE NOCASE AND artist = ? COLLATE NOCASE \
             ORDER BY sequence LIMIT 1",
        )
        .bind(title)
        .bind(artist)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| row_to_song(&r)).transpose()
    }

    async fn find_by_variant(
        &self,
        norm_title: &str,
        norm_artist: &str,
        title: &str,
        artist: &str,
    ) -> Result<Option<Song>> {
        let folded_title = fold_variants(title);
        let folded_artist = fold_variants(artist);
        if folded_title.is_empty() {
            return Ok(None);
        }

        // SQLite has no tolerant-equality operator, so scan a bounded
        // token-keyed candidate set and compare folded forms in process.
        let token = folded_title
            .split_whitespace()
            .next()
            .unwrap_or(norm_title)
            .to_string();
        debug!(target: "repository", norm_title, norm_artist, token, "variant lookup");

        let candidates = self.candidates_by_token(&token).await?;
        Ok(candidates.into_iter().find(|song| {
            fold_variants(&song.title) == folded_title && fold_variants(&song.artist) == folded_artist
        }))
    }

    async fn candidates_by_token(&self, token: &str) -> Result<Vec<Song>> {
        if token.is_empty() {
            return Ok(Vec::new());
        }
        debug!(target: "repository", token, "fetching candidates by token");
        let pattern = format!("%{}%", token);
        let rows = sqlx::query(
            "SELECT * FROM songs WHERE norm_title LIKE ? OR norm_artist LIKE ? \
             ORDER BY sequence LIMIT ?",
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(CANDIDATE_LIMIT)
        .fetch_all(&self.pool)
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            out.push(row_to_song(&r)?);
        }
        Ok(out)
    }

    async fn latest_dated_at_or_before(&self, date: NaiveDate) -> Result<Option<Song>> {
        debug!(target: "repository", %date, "fetching latest dated row at or before");
        let row = sqlx::query(
            "SELECT * FROM songs WHERE first_listen_date IS NOT NULL AND first_listen_date <= ? \
             ORDER BY first_listen_date DESC, sequence DESC LIMIT 1",
        )
        .bind(date.format("%Y-%m-%d").to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| row_to_song(&r)).transpose()
    }

    async fn max_sequence(&self) -> Result<i64> {
        let max: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(sequence), 0) FROM songs")
            .fetch_one(&self.pool)
            .await?;
        Ok(max)
    }

    async fn insert(&self, song: Song) -> Result<Song> {
        debug!(target: "repository", song_id = %song.id, sequence = song.sequence, "inserting song");
        let q = r#"
            INSERT INTO songs (
                id, title, artist, norm_title, norm_artist,
                first_listen_date, first_listen_at, sequence, notes,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#;
        sqlx::query(q)
            .bind(song.id.to_string())
            .bind(song.title.clone())
            .bind(song.artist.clone())
            .bind(song.norm_title.clone())
            .bind(song.norm_artist.clone())
            .bind(song.first_listen_date.map(|d| d.format("%Y-%m-%d").to_string()))
            .bind(song.first_listen_at.map(|t| t.to_rfc3339()))
            .bind(song.sequence)
            .bind(song.notes.clone())
            .bind(song.created_at.to_rfc3339())
            .bind(song.updated_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(song)
    }

    async fn update(&self, song: &Song) -> Result<()> {
        debug!(target: "repository", song_id = %song.id, sequence = song.sequence, "updating song");
        let q = r#"
            UPDATE songs SET
                title = ?,
                artist = ?,
                norm_title = ?,
                norm_artist = ?,
                first_listen_date = ?,
                first_listen_at = ?,
                sequence = ?,
                notes = ?,
                updated_at = ?
            WHERE id = ?
        "#;
        sqlx::query(q)
            .bind(song.title.clone())
            .bind(song.artist.clone())
            .bind(song.norm_title.clone())
            .bind(song.norm_artist.clone())
            .bind(song.first_listen_date.map(|d| d.format("%Y-%m-%d").to_string()))
            .bind(song.first_listen_at.map(|t| t.to_rfc3339()))
            .bind(song.sequence)
            .bind(song.notes.clone())
            .bind(song.updated_at.to_rfc3339())
            .bind(song.id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn shift_sequences(&self, from: i64, below: i64, delta: i64) -> Result<()> {
        debug!(target: "repository", from, below, delta, "shifting sequences");
        // Row-by-row in descending sequence order: the store offers no
        // transaction guarantee we rely on, so ordering alone keeps live
        // rows from colliding mid-shift.
        let rows = sqlx::query(
            "SELECT id FROM songs WHERE sequence >= ? AND sequence < ? ORDER BY sequence DESC",
        )
        .bind(from)
        .bind(below)
        .fetch_all(&self.pool)
        .await?;
        for r in rows {
            let id: String = r.try_get("id")?;
            sqlx::query("UPDATE songs SET sequence = sequence + ? WHERE id = ?")
                .bind(delta)
                .bind(id)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn compact_sequences(&self) -> Result<CompactionOutcome> {
        // Fast path: single-statement renumber via a window function.
        let fast = sqlx::query(
            r#"
            UPDATE songs SET sequence = (
                SELECT rn FROM (
                    SELECT id, ROW_NUMBER() OVER (ORDER BY sequence) AS rn FROM songs
                ) ranked WHERE ranked.id = songs.id
            )
            "#,
        )
        .execute(&self.pool)
        .await;

        match fast {
            Ok(done) => {
                debug!(target: "repository", rows = done.rows_affected(), "compacted sequences");
                return Ok(CompactionOutcome::Compacted {
                    rows: done.rows_affected(),
                });
            }
            Err(e) => {
                warn!(target: "repository", error = %e, "window-function compaction unavailable, falling back");
            }
        }

        // Fallback: ascending renumber. Each new value is <= the row's
        // current one, so ascending write order cannot collide.
        let rows = sqlx::query("SELECT id, sequence FROM songs ORDER BY sequence ASC")
            .fetch_all(&self.pool)
            .await;
        let rows = match rows {
            Ok(rows) => rows,
            Err(e) => return Ok(CompactionOutcome::Skipped(e.to_string())),
        };

        let mut renumbered = 0u64;
        for (index, r) in rows.iter().enumerate() {
            let id: String = r.try_get("id")?;
            let current: i64 = r.try_get("sequence")?;
            let target = index as i64 + 1;
            if current == target {
                continue;
            }
            let write = sqlx::query("UPDATE songs SET sequence = ? WHERE id = ?")
                .bind(target)
                .bind(id)
                .execute(&self.pool)
                .await;
            match write {
                Ok(_) => renumbered += 1,
                Err(e) => return Ok(CompactionOutcome::Skipped(e.to_string())),
            }
        }
        Ok(CompactionOutcome::Compacted { rows: renumbered })
    }
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

fn parse_dt(s: String) -> Result<DateTime<Utc>> {
    // Try RFC3339 first
    if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
        return Ok(dt.with_timezone(&Utc));
    }
    // Fallback to SQLite default CURRENT_TIMESTAMP format: "YYYY-MM-DD HH:MM:SS"
    let ndt = NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")?;
    Ok(DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
}

fn parse_date_opt(s: Option<String>) -> Result<Option<NaiveDate>> {
    match s {
        Some(val) => Ok(Some(NaiveDate::parse_from_str(&val, "%Y-%m-%d")?)),
        None => Ok(None),
    }
}

fn row_to_song(row: &sqlx::sqlite::SqliteRow) -> Result<Song> {
    let id_str: String = row.try_get("id")?;
    let id = SongId::from_uuid(Uuid::parse_str(&id_str)?);

    let first_listen_date: Option<String> = row.try_get("first_listen_date")?;
    let first_listen_at: Option<String> = row.try_get("first_listen_at")?;
    let created_at_s: String = row.try_get("created_at")?;
    let updated_at_s: String = row.try_get("updated_at")?;

    Ok(Song {
        id,
        title: row.try_get("title")?,
        artist: row.try_get("artist")?,
        norm_title: row.try_get("norm_title")?,
        norm_artist: row.try_get("norm_artist")?,
        first_listen_date: parse_date_opt(first_listen_date)?,
        first_listen_at: first_listen_at.map(parse_dt).transpose()?,
        sequence: row.try_get("sequence")?,
        notes: row.try_get("notes")?,
        created_at: parse_dt(created_at_s)?,
        updated_at: parse_dt(updated_at_s)?,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    async fn repository() -> SqliteCatalogRepository {
        // A single connection keeps the in-memory database alive and shared.
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool");
        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .expect("migrations");
        SqliteCatalogRepository::new(pool)
    }

    fn dated(title: &str, artist: &str, date: &str, sequence: i64) -> Song {
        let mut song = Song::new(title, artist, sequence);
        song.first_listen_date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok();
        song
    }

    #[tokio::test]
    async fn insert_and_find_by_normalized() {
        let repo = repository().await;
        repo.insert(dated("Pyramid Song", "Radiohead", "2001-05-21", 1))
            .await
            .unwrap();

        let found = repo
            .find_by_normalized("pyramid song", "radiohead")
            .await
            .unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().sequence, 1);

        let miss = repo.find_by_normalized("pyramid song", "someone").await.unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn find_by_literal_is_case_insensitive() {
        let repo = repository().await;
        repo.insert(dated("Pyramid Song", "Radiohead", "2001-05-21", 1))
            .await
            .unwrap();

        let found = repo
            .find_by_literal_ci("PYRAMID SONG", "radiohead")
            .await
            .unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn find_by_variant_tolerates_feat_clause() {
        let repo = repository().await;
        repo.insert(dated("Crew Love (feat. The Weeknd)", "Drake", "2012-01-10", 1))
            .await
            .unwrap();

        let key = tunelog_domain::ReconciliationKey::new("Crew Love", "Drake");
        let found = repo
            .find_by_variant(&key.norm_title, &key.norm_artist, "Crew Love", "Drake")
            .await
            .unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn latest_dated_at_or_before_breaks_ties_by_sequence() {
        let repo = repository().await;
        repo.insert(dated("A", "X", "2020-01-01", 1)).await.unwrap();
        repo.insert(dated("B", "X", "2020-03-01", 2)).await.unwrap();
        repo.insert(dated("C", "X", "2020-03-01", 3)).await.unwrap();
        repo.insert(dated("D", "X", "2020-06-01", 4)).await.unwrap();

        let anchor = repo
            .latest_dated_at_or_before(NaiveDate::from_ymd_opt(2020, 4, 1).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(anchor.sequence, 3);

        let none = repo
            .latest_dated_at_or_before(NaiveDate::from_ymd_opt(2019, 1, 1).unwrap())
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn shift_sequences_moves_only_the_range() {
        let repo = repository().await;
        for (i, title) in ["A", "B", "C", "D"].iter().enumerate() {
            repo.insert(dated(title, "X", "2020-01-01", i as i64 + 1))
                .await
                .unwrap();
        }

        repo.shift_sequences(2, 4, 1).await.unwrap();

        let a = repo.find_by_normalized("a", "x").await.unwrap().unwrap();
        let b = repo.find_by_normalized("b", "x").await.unwrap().unwrap();
        let c = repo.find_by_normalized("c", "x").await.unwrap().unwrap();
        let d = repo.find_by_normalized("d", "x").await.unwrap().unwrap();
        assert_eq!((a.sequence, b.sequence, c.sequence, d.sequence), (1, 3, 4, 4));
    }

    #[tokio::test]
    async fn compact_renumbers_to_dense_sequence() {
        let repo = repository().await;
        repo.insert(dated("A", "X", "2020-01-01", 3)).await.unwrap();
        repo.insert(dated("B", "X", "2020-02-01", 7)).await.unwrap();
        repo.insert(dated("C", "X", "2020-03-01", 20)).await.unwrap();

        let outcome = repo.compact_sequences().await.unwrap();
        assert!(matches!(outcome, CompactionOutcome::Compacted { .. }));

        let a = repo.find_by_normalized("a", "x").await.unwrap().unwrap();
        let b = repo.find_by_normalized("b", "x").await.unwrap().unwrap();
        let c = repo.find_by_normalized("c", "x").await.unwrap().unwrap();
        assert_eq!((a.sequence, b.sequence, c.sequence), (1, 2, 3));
    }

    #[tokio::test]
    async fn max_sequence_defaults_to_zero() {
        let repo = repository().await;
        assert_eq!(repo.max_sequence().await.unwrap(), 0);
        repo.insert(dated("A", "X", "2020-01-01", 9)).await.unwrap();
        assert_eq!(repo.max_sequence().await.unwrap(), 9);
    }
}
