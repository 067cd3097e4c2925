// SPDX-License-Identifier: GPL-3.0-or-later

//! The per-key merge decision engine.
//!
//! For each unique song key the engine combines exact matching, fuzzy
//! ranking and position resolution into exactly one of create, update,
//! link or skip, then (in commit mode) applies the corresponding catalog
//! mutation. An existing record is never demoted by a play of equal age.

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};
use tunelog_domain::{ReconciliationKey, Song, SongId, Validate};
use tunelog_infrastructure::repositories::CatalogRepository;

use crate::matching::ExactMatcher;
use crate::position::{PositionResolver, Reservations};
use crate::suggestion::{Suggestion, SuggestionRanker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionAction {
    Create,
    Update,
    Link,
    Skip,
}

impl std::fmt::Display for DecisionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Link => write!(f, "link"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

/// One outcome per unique key per batch; structurally identical between
/// dry-run and commit.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub action: DecisionAction,
    pub key: ReconciliationKey,
    pub title: String,
    pub artist: String,
    pub date: Option<NaiveDate>,
    pub existing_song_id: Option<SongId>,
    pub existing_date: Option<NaiveDate>,
    pub new_date: Option<NaiveDate>,
    pub insertion_position: Option<i64>,
    pub suggestion: Option<Suggestion>,
}

/// Caller-forced outcome for one key, bypassing matcher and ranker.
#[derive(Debug, Clone)]
pub enum ReconcileOverride {
    /// Link against a reviewed and accepted existing song.
    LinkTo(SongId),
    /// Create a new row even if a suggestion existed.
    ForceCreate,
}

/// The earliest surviving play for one key within a batch.
#[derive(Debug, Clone)]
pub(crate) struct DatedPlay {
    pub title: String,
    pub artist: String,
    pub key: ReconciliationKey,
    pub date: NaiveDate,
    pub played_at: Option<DateTime<Utc>>,
}

pub struct MergeDecisionEngine {
    catalog: Arc<dyn CatalogRepository>,
    matcher: ExactMatcher,
    ranker: SuggestionRanker,
    resolver: PositionResolver,
}

impl MergeDecisionEngine {
    pub fn new(catalog: Arc<dyn CatalogRepository>) -> Self {
        Self {
            matcher: ExactMatcher::new(catalog.clone()),
            ranker: SuggestionRanker::new(catalog.clone()),
            resolver: PositionResolver::new(catalog.clone()),
            catalog,
        }
    }

    /// Decide the outcome for one key. Read-only against the store apart
    /// from batch-local reservations, so dry-run and commit share it.
    pub(crate) async fn decide(
        &self,
        play: &DatedPlay,
        forced: Option<&ReconcileOverride>,
        reservations: &mut Reservations,
    ) -> Result<Decision> {
        match forced {
            Some(ReconcileOverride::LinkTo(song_id)) => {
                let existing = self.catalog.find_by_id(*song_id).await?;
                if existing.is_none() {
                    warn!(target: "reconcile", key = %play.key, song_id = %song_id, "override target not found, linking anyway");
                }
                return Ok(Decision {
                    action: DecisionAction::Link,
                    existing_song_id: Some(*song_id),
                    existing_date: existing.and_then(|s| s.first_listen_date),
                    ..self.base_decision(play)
                });
            }
            Some(ReconcileOverride::ForceCreate) => {
                let candidate = self.resolver.resolve(play.date).await?;
                let position = reservations.reserve(candidate);
                return Ok(Decision {
                    action: DecisionAction::Create,
                    new_date: Some(play.date),
                    insertion_position: Some(position),
                    ..self.base_decision(play)
                });
            }
            None => {}
        }

        let existing = self
            .matcher
            .find_exact(&play.key, &play.title, &play.artist)
            .await?;

        let Some(existing) = existing else {
            let candidate = self.resolver.resolve(play.date).await?;
            let position = reservations.reserve(candidate);
            // A suggestion is a hint for human override only; losing it to
            // a store error must not fail the key.
            let suggestion = match self.ranker.suggest(&play.key).await {
                Ok(suggestion) => suggestion,
                Err(e) => {
                    warn!(target: "reconcile", key = %play.key, error = %e, "suggestion ranking failed");
                    None
                }
            };
            return Ok(Decision {
                action: DecisionAction::Create,
                new_date: Some(play.date),
                insertion_position: Some(position),
                suggestion,
                ..self.base_decision(play)
            });
        };

        match existing.first_listen_date {
            Some(existing_date) => {
                if incoming_is_earlier(existing_date, existing.first_listen_at, play) {
                    let candidate = self.resolver.resolve(play.date).await?;
                    let position = reservations.reserve(candidate);
                    debug!(
                        target: "reconcile",
                        key = %play.key,
                        song_id = %existing.id,
                        %existing_date,
                        new_date = %play.date,
                        position,
                        "incoming play is earlier, moving record"
                    );
                    Ok(Decision {
                        action: DecisionAction::Update,
                        existing_song_id: Some(existing.id),
                        existing_date: Some(existing_date),
                        new_date: Some(play.date),
                        insertion_position: Some(position),
                        ..self.base_decision(play)
                    })
                } else {
                    Ok(Decision {
                        action: DecisionAction::Link,
                        existing_song_id: Some(existing.id),
                        existing_date: Some(existing_date),
                        ..self.base_decision(play)
                    })
                }
            }
            None => {
                // Undated legacy row: infer its place from where the
                // incoming date would land.
                let candidate = self.resolver.resolve(play.date).await?;
                if existing.sequence <= candidate {
                    debug!(
                        target: "reconcile",
                        key = %play.key,
                        song_id = %existing.id,
                        sequence = existing.sequence,
                        candidate,
                        "undated record already at or before candidate, linking"
                    );
                    Ok(Decision {
                        action: DecisionAction::Link,
                        existing_song_id: Some(existing.id),
                        ..self.base_decision(play)
                    })
                } else {
                    let position = reservations.reserve(candidate);
                    Ok(Decision {
                        action: DecisionAction::Update,
                        existing_song_id: Some(existing.id),
                        new_date: Some(play.date),
                        insertion_position: Some(position),
                        ..self.base_decision(play)
                    })
                }
            }
        }
    }

    /// Apply a decided mutation to the catalog. Only the batch runner in
    /// commit mode calls this; dry-run stops after `decide`.
    pub(crate) async fn apply(&self, decision: &Decision, play: &DatedPlay) -> Result<()> {
        match decision.action {
            DecisionAction::Create => self.apply_create(decision, play).await,
            DecisionAction::Update => self.apply_update(decision, play).await,
            DecisionAction::Link | DecisionAction::Skip => Ok(()),
        }
    }

    async fn apply_create(&self, decision: &Decision, play: &DatedPlay) -> Result<()> {
        let position = decision
            .insertion_position
            .ok_or_else(|| anyhow!("create decision without insertion position"))?;

        // Everything at or after the insertion point moves up one before
        // the new row is written at the freed slot.
        let max = self.catalog.max_sequence().await?;
        if position <= max {
            self.catalog.shift_sequences(position, max + 1, 1).await?;
        }

        let mut song = Song::new(play.title.clone(), play.artist.clone(), position);
        song.first_listen_date = Some(play.date);
        song.first_listen_at = play.played_at;
        if let Err(errors) = song.validate() {
            return Err(anyhow!(
                "refusing to insert invalid song: {}",
                errors
                    .iter()
                    .map(|e| format!("{}: {}", e.field, e.message))
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        self.catalog.insert(song).await?;
        Ok(())
    }

    async fn apply_update(&self, decision: &Decision, play: &DatedPlay) -> Result<()> {
        let song_id = decision
            .existing_song_id
            .ok_or_else(|| anyhow!("update decision without existing song id"))?;
        let Some(mut song) = self.catalog.find_by_id(song_id).await? else {
            return Err(anyhow!("song {} vanished before update", song_id));
        };

        song.first_listen_date = decision.new_date.or(Some(play.date));
        if play.played_at.is_some() {
            song.first_listen_at = play.played_at;
        }
        song.updated_at = Utc::now();

        let old_position = song.sequence;
        if let Some(target) = decision.insertion_position {
            if target < old_position {
                match self.catalog.shift_sequences(target, old_position, 1).await {
                    Ok(()) => song.sequence = target,
                    Err(e) => {
                        // Best-effort degradation: keep the earlier date,
                        // skip the sequence move.
                        warn!(
                            target: "reconcile",
                            song_id = %song.id,
                            error = %e,
                            "sequence shift failed, setting date without move"
                        );
                    }
                }
            }
        }

        self.catalog.update(&song).await?;
        Ok(())
    }

    fn base_decision(&self, play: &DatedPlay) -> Decision {
        Decision {
            action: DecisionAction::Skip,
            key: play.key.clone(),
            title: play.title.clone(),
            artist: play.artist.clone(),
            date: Some(play.date),
            existing_song_id: None,
            existing_date: None,
            new_date: None,
            insertion_position: None,
            suggestion: None,
        }
    }
}

/// Whether the incoming play is strictly earlier than the recorded first
/// listen. Timestamps win when both sides carry one; equal instants are
/// never earlier, so ties resolve to link.
fn incoming_is_earlier(
    existing_date: NaiveDate,
    existing_at: Option<DateTime<Utc>>,
    play: &DatedPlay,
) -> bool {
    if let (Some(existing), Some(incoming)) = (existing_at, play.played_at) {
        return incoming < existing;
    }
    play.date < existing_date
}
