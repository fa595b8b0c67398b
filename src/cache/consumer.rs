//! Cache consumer for executing consumption plans.
//!
//! Drains the event bus, merges the events into a plan and drops the
//! affected entries from both tiers.

use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use tokio::sync::watch;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::config::CacheConfig;
use super::events::EventBus;
use super::planner::ConsumptionPlan;
use super::store::TwoTierStore;

const METRIC_CACHE_CONSUME_MS: &str = "bizdash_cache_consume_ms";

/// Outcome of one consumption pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumeOutcome {
    /// Events drained from the bus, duplicates included.
    pub drained: usize,
    /// Entries removed across both tiers.
    pub removed: usize,
    /// Whether the plan asked for any invalidation.
    pub invalidated: bool,
}

/// Applies queued invalidation events to the store.
///
/// Every applied plan bumps a generation counter that views can watch to
/// re-query after real data changes.
pub struct CacheConsumer {
    config: CacheConfig,
    store: Arc<TwoTierStore>,
    bus: Arc<EventBus>,
    generation: watch::Sender<u64>,
}

impl CacheConsumer {
    pub fn new(config: CacheConfig, store: Arc<TwoTierStore>, bus: Arc<EventBus>) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            config,
            store,
            bus,
            generation,
        }
    }

    /// Consume pending events until the bus is empty.
    #[instrument(skip(self))]
    pub fn consume(&self) -> ConsumeOutcome {
        let mut total = ConsumeOutcome::default();
        loop {
            let batch = self.consume_batch();
            if batch.drained == 0 {
                break;
            }
            total.drained += batch.drained;
            total.removed += batch.removed;
            total.invalidated |= batch.invalidated;
        }
        total
    }

    /// Consume at most one batch of `consume_batch_limit` events.
    pub fn consume_batch(&self) -> ConsumeOutcome {
        let started_at = Instant::now();
        let events = self.bus.drain(self.config.consume_batch_limit.max(1));
        if events.is_empty() {
            return ConsumeOutcome::default();
        }

        let drained = events.len();
        let event_ids: Vec<Uuid> = events.iter().map(|queued| queued.event.id).collect();
        let plan = ConsumptionPlan::from_events(events);

        info!(
            event_count = drained,
            event_ids = ?event_ids,
            plan = %plan,
            "Cache consumption starting"
        );

        let removed = if plan.clear_all {
            self.store.clear()
        } else if !plan.invalidate.is_empty() {
            self.store.invalidate_kinds(&plan.kinds())
        } else {
            0
        };

        let invalidated = !plan.is_empty();
        if invalidated {
            self.generation.send_modify(|generation| *generation += 1);
        }

        info!(
            event_count = drained,
            removed,
            generation = *self.generation.borrow(),
            "Cache consumption complete"
        );

        histogram!(METRIC_CACHE_CONSUME_MS)
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        ConsumeOutcome {
            drained,
            removed,
            invalidated,
        }
    }

    /// Subscribe to the invalidation generation.
    ///
    /// The value changes only when a consumed plan invalidated at least one
    /// query kind.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        debug!(
            receivers = self.generation.receiver_count(),
            "Cache generation subscriber added"
        );
        self.generation.subscribe()
    }

    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }
}
