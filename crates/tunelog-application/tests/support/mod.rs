// SPDX-License-Identifier: GPL-3.0-or-later

//! In-memory catalog double mirroring the SQLite adapter's observable
//! behavior, for driving the reconciliation core without a database.

use anyhow::Result;
use chrono::NaiveDate;
use std::sync::Mutex;
use tunelog_domain::{fold_variants, Song, SongId};
use tunelog_infrastructure::repositories::{CatalogRepository, CompactionOutcome};

#[derive(Default)]
pub struct MemoryCatalog {
    songs: Mutex<Vec<Song>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, song: Song) {
        self.songs.lock().unwrap().push(song);
    }

    /// All rows, ordered by sequence.
    pub fn snapshot(&self) -> Vec<Song> {
        let mut songs = self.songs.lock().unwrap().clone();
        songs.sort_by_key(|s| s.sequence);
        songs
    }
}

#[async_trait::async_trait]
impl CatalogRepository for MemoryCatalog {
    async fn find_by_id(&self, id: SongId) -> Result<Option<Song>> {
        Ok(self
            .songs
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned())
    }

    async fn find_by_normalized(
        &self,
        norm_title: &str,
        norm_artist: &str,
    ) -> Result<Option<Song>> {
        Ok(self
            .songs
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.norm_title == norm_title && s.norm_artist == norm_artist)
            .min_by_key(|s| s.sequence)
            .cloned())
    }

    async fn find_by_literal_ci(&self, title: &str, artist: &str) -> Result<Option<Song>> {
        Ok(self
            .songs
            .lock()
            .unwrap()
            .iter()
            .filter(|s| {
                s.title.eq_ignore_ascii_case(title) && s.artist.eq_ignore_ascii_case(artist)
            })
            .min_by_key(|s| s.sequence)
            .cloned())
    }

    async fn find_by_variant(
        &self,
        _norm_title: &str,
        _norm_artist: &str,
        title: &str,
        artist: &str,
    ) -> Result<Option<Song>> {
        let folded_title = fold_variants(title);
        let folded_artist = fold_variants(artist);
        if folded_title.is_empty() {
            return Ok(None);
        }
        Ok(self
            .songs
            .lock()
            .unwrap()
            .iter()
            .filter(|s| {
                fold_variants(&s.title) == folded_title && fold_variants(&s.artist) == folded_artist
            })
            .min_by_key(|s| s.sequence)
            .cloned())
    }

    async fn candidates_by_token(&self, token: &str) -> Result<Vec<Song>> {
        if token.is_empty() {
            return Ok(Vec::new());
        }
        let mut out: Vec<Song> = self
            .songs
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.norm_title.contains(token) || s.norm_artist.contains(token))
            .cloned()
            .collect();
        out.sort_by_key(|s| s.sequence);
        out.truncate(50);
        Ok(out)
    }

    async fn latest_dated_at_or_before(&self, date: NaiveDate) -> Result<Option<Song>> {
        Ok(self
            .songs
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.first_listen_date.map(|d| d <= date).unwrap_or(false))
            .max_by_key(|s| (s.first_listen_date, s.sequence))
            .cloned())
    }

    async fn max_sequence(&self) -> Result<i64> {
        Ok(self
            .songs
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.sequence)
            .max()
            .unwrap_or(0))
    }

    async fn insert(&self, song: Song) -> Result<Song> {
        self.songs.lock().unwrap().push(song.clone());
        Ok(song)
    }

    async fn update(&self, song: &Song) -> Result<()> {
        let mut songs = self.songs.lock().unwrap();
        if let Some(existing) = songs.iter_mut().find(|s| s.id == song.id) {
            *existing = song.clone();
        }
        Ok(())
    }

    async fn shift_sequences(&self, from: i64, below: i64, delta: i64) -> Result<()> {
        let mut songs = self.songs.lock().unwrap();
        for song in songs.iter_mut() {
            if song.sequence >= from && song.sequence < below {
                song.sequence += delta;
            }
        }
        Ok(())
    }

    async fn compact_sequences(&self) -> Result<CompactionOutcome> {
        let mut songs = self.songs.lock().unwrap();
        songs.sort_by_key(|s| s.sequence);
        let mut renumbered = 0u64;
        for (index, song) in songs.iter_mut().enumerate() {
            let target = index as i64 + 1;
            if song.sequence != target {
                song.sequence = target;
                renumbered += 1;
            }
        }
        Ok(CompactionOutcome::Compacted { rows: renumbered })
    }
}

/// A song seeded with a known first-listen date.
pub fn dated_song(title: &str, artist: &str, date: &str, sequence: i64) -> Song {
    let mut song = Song::new(title, artist, sequence);
    song.first_listen_date = Some(NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap());
    song
}

/// A legacy row with no recorded first listen.
pub fn undated_song(title: &str, artist: &str, sequence: i64) -> Song {
    Song::new(title, artist, sequence)
}
