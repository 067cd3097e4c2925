// SPDX-License-Identifier: GPL-3.0-or-later

//! Reconciliation core for the chronological listening log.
//!
//! Incoming plays flow through normalization, tiered exact matching, fuzzy
//! suggestion ranking and position resolution into one merge decision per
//! unique song, driven over an ordered batch by the runner in [`batch`].

pub mod batch;
pub mod matching;
pub mod position;
pub mod reconcile;
pub mod source;
pub mod suggestion;

pub use batch::{
    ReconcileError, ReconcileOutcome, ReconcileSummary, ReconciliationService, RunMode,
};
pub use matching::ExactMatcher;
pub use position::{PositionResolver, Reservations};
pub use reconcile::{Decision, DecisionAction, MergeDecisionEngine, ReconcileOverride};
pub use source::{PlayHistorySource, SyncCriteria};
pub use suggestion::{MatchType, Suggestion, SuggestionRanker};
