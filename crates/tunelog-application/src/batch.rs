// SPDX-License-Identifier: GPL-3.0-or-later

//! The batch runner: drives the merge decision engine over an ordered
//! batch of incoming plays, either recording decisions only (dry run) or
//! also performing the catalog mutations (commit).
//!
//! Both modes share the exact same decision routine, so a user-approved
//! dry-run plan committed immediately after with the same inputs produces
//! the same decisions.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use tunelog_domain::{IncomingPlay, ReconciliationKey};
use tunelog_infrastructure::repositories::{CatalogRepository, CompactionOutcome};
use tunelog_scrobble::ScrobbleError;

use crate::position::Reservations;
use crate::reconcile::{
    DatedPlay, Decision, DecisionAction, MergeDecisionEngine, ReconcileOverride,
};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("no dated plays to reconcile")]
    NoDatedPlays,

    #[error("missing source criteria: {0}")]
    MissingCriteria(String),

    #[error(transparent)]
    Source(#[from] ScrobbleError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    DryRun,
    Commit,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub created: usize,
    pub updated: usize,
    pub linked: usize,
    pub skipped: usize,
}

#[derive(Debug)]
pub struct ReconcileOutcome {
    pub decisions: Vec<Decision>,
    pub summary: ReconcileSummary,
    /// Present after a commit; dry runs never compact.
    pub compaction: Option<CompactionOutcome>,
}

/// Entry point exposed to callers: preview (dry run) and commit.
pub struct ReconciliationService {
    engine: MergeDecisionEngine,
    catalog: Arc<dyn CatalogRepository>,
}

impl ReconciliationService {
    pub fn new(catalog: Arc<dyn CatalogRepository>) -> Self {
        Self {
            engine: MergeDecisionEngine::new(catalog.clone()),
            catalog,
        }
    }

    /// Full decision computation with no persisted mutation.
    pub async fn preview(
        &self,
        plays: Vec<IncomingPlay>,
        overrides: &HashMap<ReconciliationKey, ReconcileOverride>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        self.run(plays, RunMode::DryRun, overrides).await
    }

    /// Decide and mutate, then compact sequences best-effort.
    pub async fn commit(
        &self,
        plays: Vec<IncomingPlay>,
        overrides: &HashMap<ReconciliationKey, ReconcileOverride>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        self.run(plays, RunMode::Commit, overrides).await
    }

    async fn run(
        &self,
        plays: Vec<IncomingPlay>,
        mode: RunMode,
        overrides: &HashMap<ReconciliationKey, ReconcileOverride>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let mut summary = ReconcileSummary::default();
        let mut skip_decisions = Vec::new();
        let mut dated = Vec::new();

        for play in plays {
            match play.date {
                Some(date) => dated.push(DatedPlay {
                    key: play.key(),
                    title: play.title,
                    artist: play.artist,
                    date,
                    played_at: play.played_at,
                }),
                None => {
                    summary.skipped += 1;
                    skip_decisions.push(Decision {
                        action: DecisionAction::Skip,
                        key: play.key(),
                        title: play.title,
                        artist: play.artist,
                        date: None,
                        existing_song_id: None,
                        existing_date: None,
                        new_date: None,
                        insertion_position: None,
                        suggestion: None,
                    });
                }
            }
        }

        if dated.is_empty() {
            return Err(ReconcileError::NoDatedPlays);
        }

        let batch = dedup_and_sort(dated);
        info!(
            target: "reconcile",
            mode = ?mode,
            keys = batch.len(),
            undated = summary.skipped,
            "starting reconciliation batch"
        );

        // Batch-local state only: reservations live and die with this run.
        let mut reservations = Reservations::new();
        let mut decisions = Vec::with_capacity(batch.len());

        for play in &batch {
            let forced = overrides.get(&play.key);
            let decision = match self.engine.decide(play, forced, &mut reservations).await {
                Ok(decision) => decision,
                Err(e) => {
                    // One bad key cannot block the rest of the history.
                    warn!(target: "reconcile", key = %play.key, error = %e, "key failed, continuing batch");
                    summary.skipped += 1;
                    continue;
                }
            };

            if mode == RunMode::Commit {
                if let Err(e) = self.engine.apply(&decision, play).await {
                    warn!(target: "reconcile", key = %play.key, error = %e, "mutation failed for key");
                }
            }

            match decision.action {
                DecisionAction::Create => summary.created += 1,
                DecisionAction::Update => summary.updated += 1,
                DecisionAction::Link => summary.linked += 1,
                DecisionAction::Skip => summary.skipped += 1,
            }
            decisions.push(decision);
        }

        let compaction = match mode {
            RunMode::Commit => match self.catalog.compact_sequences().await {
                Ok(outcome) => {
                    info!(target: "reconcile", ?outcome, "compaction pass finished");
                    Some(outcome)
                }
                Err(e) => {
                    // Compaction is an optimization; gaps are legal.
                    warn!(target: "reconcile", error = %e, "compaction failed, leaving gaps");
                    None
                }
            },
            RunMode::DryRun => None,
        };

        decisions.extend(skip_decisions);

        info!(
            target: "reconcile",
            mode = ?mode,
            created = summary.created,
            updated = summary.updated,
            linked = summary.linked,
            skipped = summary.skipped,
            "reconciliation batch finished"
        );

        Ok(ReconcileOutcome {
            decisions,
            summary,
            compaction,
        })
    }
}

/// Keep the earliest surviving play per key, then order oldest to newest.
///
/// The engine depends on this ordering: processing out of order would
/// break the first-play-per-key rule, so it is enforced here rather than
/// left to source iteration order.
fn dedup_and_sort(plays: Vec<DatedPlay>) -> Vec<DatedPlay> {
    let mut earliest: HashMap<ReconciliationKey, DatedPlay> = HashMap::new();
    for play in plays {
        match earliest.get(&play.key) {
            Some(kept) if instant_key(kept) <= instant_key(&play) => {}
            _ => {
                earliest.insert(play.key.clone(), play);
            }
        }
    }

    let mut batch: Vec<DatedPlay> = earliest.into_values().collect();
    batch.sort_by_key(instant_key);
    batch
}

/// Chronological sort key: date first, exact instant when present. Plays
/// without a timestamp sort at the start of their day.
fn instant_key(play: &DatedPlay) -> (chrono::NaiveDate, chrono::DateTime<chrono::Utc>) {
    let start_of_day = play
        .date
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc();
    (play.date, play.played_at.unwrap_or(start_of_day))
}
