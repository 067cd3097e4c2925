// SPDX-License-Identifier: GPL-3.0-or-later

//! Chronological position resolution and batch-local slot reservation.

use anyhow::Result;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;
use tunelog_infrastructure::repositories::CatalogRepository;

/// Computes where a new or moved catalog row belongs in the sequence.
pub struct PositionResolver {
    catalog: Arc<dyn CatalogRepository>,
}

impl PositionResolver {
    pub fn new(catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { catalog }
    }

    /// Candidate position for a row first heard on `target`.
    ///
    /// Anchors on the latest dated row at or before the target date. With
    /// no dated anchor the row is appended after the highest sequence —
    /// a deliberate simplification: undated history gives nothing to
    /// insert between.
    pub async fn resolve(&self, target: NaiveDate) -> Result<i64> {
        if let Some(anchor) = self.catalog.latest_dated_at_or_before(target).await? {
            debug!(
                target: "position",
                %target,
                anchor_id = %anchor.id,
                anchor_sequence = anchor.sequence,
                "anchored position"
            );
            return Ok(anchor.sequence + 1);
        }

        let max = self.catalog.max_sequence().await?;
        debug!(target: "position", %target, max, "no dated anchor, appending at end");
        Ok(max + 1)
    }
}

/// Batch-scoped position claims.
///
/// Explicit local state threaded through one run — never process-global —
/// so concurrent batches cannot contaminate each other's claims. Two
/// simultaneous creates in one run can never request the same slot.
#[derive(Debug, Default)]
pub struct Reservations {
    claimed: BTreeSet<i64>,
}

impl Reservations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `candidate`, walking forward past slots already claimed
    /// earlier in the same batch.
    pub fn reserve(&mut self, candidate: i64) -> i64 {
        let mut position = candidate;
        while self.claimed.contains(&position) {
            position += 1;
        }
        self.claimed.insert(position);
        position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_returns_candidate_when_free() {
        let mut reservations = Reservations::new();
        assert_eq!(reservations.reserve(5), 5);
    }

    #[test]
    fn reserve_bumps_past_claimed_slots() {
        let mut reservations = Reservations::new();
        assert_eq!(reservations.reserve(5), 5);
        assert_eq!(reservations.reserve(5), 6);
        assert_eq!(reservations.reserve(5), 7);
        assert_eq!(reservations.reserve(6), 8);
    }

    #[test]
    fn reserve_leaves_unrelated_slots_alone() {
        let mut reservations = Reservations::new();
        assert_eq!(reservations.reserve(10), 10);
        assert_eq!(reservations.reserve(2), 2);
        assert_eq!(reservations.reserve(11), 11);
    }
}
