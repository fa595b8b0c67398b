//! Dashboard statistics cache.
//!
//! Two tiers with independent TTLs front the expensive dashboard queries:
//!
//! - **Memory tier**: bounded LRU inside the process, short TTL
//! - **Persistent tier**: [`KeyValueStorage`] shared between sessions, longer TTL
//!
//! Invalidations from local writes, peer sessions and database change
//! notifications all flow through one [`EventBus`] drained by the
//! [`CacheConsumer`].
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enable_memory_tier = true
//! enable_persistent_tier = true
//! memory_ttl_seconds = 300
//! persistent_ttl_seconds = 1800
//! # ... see config.rs for all options
//! ```

mod channel;
mod clock;
mod config;
mod consumer;
mod context;
pub mod deps;
mod events;
mod keys;
mod listener;
mod lock;
mod planner;
mod storage;
mod store;
mod trigger;

pub use channel::{
    Broadcaster, ChangeFeed, ChangeOperation, ChangeStream, ChannelError, EventStream,
    LocalBroadcaster, LocalChangeFeed, TableChange, WATCHED_TABLES,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use consumer::{CacheConsumer, ConsumeOutcome};
pub use context::CacheContext;
pub use events::{Epoch, EventBus, EventSource, InvalidationEvent, QueuedEvent};
pub use keys::{CacheKey, ParamValue, QueryKind, QueryParams};
pub use listener::{CacheListener, ListenerHandle};
pub use planner::ConsumptionPlan;
pub use storage::{KeyValueStorage, MemoryStorage, StorageError};
pub use store::{CacheEntry, MemoryTier, PersistentTier, TwoTierStore};
pub use trigger::InvalidationService;
