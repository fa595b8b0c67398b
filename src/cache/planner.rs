//! Consumption plan generation.
//!
//! Merges a batch of invalidation events into the set of query kinds to drop.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use crate::domain::types::EntityType;

use super::deps::dependents;
use super::events::QueuedEvent;
use super::keys::QueryKind;

/// Actions to execute for cache consistency.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ConsumptionPlan {
    /// Query kinds whose entries are dropped from both tiers.
    pub invalidate: BTreeSet<QueryKind>,
    /// Drop every namespaced entry, including keys of unknown kinds.
    pub clear_all: bool,
    /// Events merged into this plan after deduplication.
    pub event_count: usize,
}

impl fmt::Display for ConsumptionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<&str> = self.invalidate.iter().map(|kind| kind.as_str()).collect();
        write!(
            f,
            "ConsumptionPlan {{ events: {}, clear_all: {}, invalidate: [{}] }}",
            self.event_count,
            self.clear_all,
            kinds.join(", ")
        )
    }
}

impl ConsumptionPlan {
    /// Merge events into a plan.
    ///
    /// Events are deduplicated by id, so an event received both locally and
    /// through the broadcast channel in one batch is counted once.
    pub fn from_events(events: Vec<QueuedEvent>) -> Self {
        let mut plan = Self::default();
        let mut seen_ids = HashSet::new();

        for queued in events {
            if !seen_ids.insert(queued.event.id) {
                continue;
            }
            plan.event_count += 1;

            if queued.event.entity_type == EntityType::All {
                plan.clear_all = true;
            }
            plan.invalidate
                .extend(dependents(queued.event.entity_type).iter().copied());
        }

        plan
    }

    pub fn is_empty(&self) -> bool {
        !self.clear_all && self.invalidate.is_empty()
    }

    /// Kinds to invalidate as a slice-friendly vector.
    pub fn kinds(&self) -> Vec<QueryKind> {
        self.invalidate.iter().copied().collect()
    }
}
