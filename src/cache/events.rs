//! Cache event system.
//!
//! Every invalidation, whether it starts from a local mutation, a peer
//! session's broadcast or a database change notification, is published into
//! one `EventBus` and applied by the consumer.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::types::EntityType;

use super::lock::mutex_lock;

const SOURCE: &str = "cache::events";
const METRIC_BUS_QUEUE_LEN: &str = "bizdash_cache_bus_queue_len";
const METRIC_BUS_DROPPED: &str = "bizdash_cache_bus_dropped_total";
const DEFAULT_BUS_LIMIT: usize = 1024;

/// Monotonic sequence number assigned when an event enters the bus.
pub type Epoch = u64;

/// Notification that records of one entity type changed.
///
/// This is the payload exchanged between sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidationEvent {
    /// Unique identifier for idempotency (UUIDv4).
    pub id: Uuid,
    /// Session that published the event; nil for database notifications.
    pub origin: Uuid,
    pub entity_type: EntityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl InvalidationEvent {
    pub fn new(origin: Uuid, entity_type: EntityType, entity_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            origin,
            entity_type,
            entity_id,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// Where an event entered this session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    /// A mutation performed by this session.
    Local,
    /// Received from the broadcast channel.
    Broadcast,
    /// Synthesized from a database table change notification.
    TableChange,
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EventSource::Local => "local",
            EventSource::Broadcast => "broadcast",
            EventSource::TableChange => "table_change",
        })
    }
}

#[derive(Debug, Clone)]
pub struct QueuedEvent {
    pub epoch: Epoch,
    pub source: EventSource,
    pub event: InvalidationEvent,
}

/// In-memory event queue for cache invalidation.
///
/// Bounded: when full, the oldest pending event is dropped. A dropped event
/// only delays coherence until the entry's TTL lapses.
pub struct EventBus {
    queue: Mutex<VecDeque<QueuedEvent>>,
    epoch_counter: AtomicU64,
    limit: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::new_with_limit(DEFAULT_BUS_LIMIT)
    }

    pub fn new_with_limit(limit: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            epoch_counter: AtomicU64::new(0),
            limit: limit.max(1),
        }
    }

    pub fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Publish an event to the bus.
    pub fn publish(&self, event: InvalidationEvent, source: EventSource) -> Epoch {
        let epoch = self.next_epoch();

        info!(
            event_id = %event.id,
            event_epoch = epoch,
            entity_type = %event.entity_type,
            entity_id = event.entity_id.as_deref().unwrap_or(""),
            source = %source,
            "Cache event enqueued"
        );

        let mut queue = mutex_lock(&self.queue, SOURCE, "publish");
        if queue.len() >= self.limit
            && let Some(dropped) = queue.pop_front()
        {
            counter!(METRIC_BUS_DROPPED).increment(1);
            warn!(
                event_id = %dropped.event.id,
                event_epoch = dropped.epoch,
                "Cache event bus full, dropped oldest event"
            );
        }
        queue.push_back(QueuedEvent {
            epoch,
            source,
            event,
        });
        gauge!(METRIC_BUS_QUEUE_LEN).set(queue.len() as f64);
        epoch
    }

    /// Drain up to `limit` events in FIFO order.
    pub fn drain(&self, limit: usize) -> Vec<QueuedEvent> {
        let mut queue = mutex_lock(&self.queue, SOURCE, "drain");
        let count = limit.min(queue.len());
        let drained: Vec<QueuedEvent> = queue.drain(..count).collect();
        gauge!(METRIC_BUS_QUEUE_LEN).set(queue.len() as f64);
        drained
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.queue, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        mutex_lock(&self.queue, SOURCE, "clear").clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
