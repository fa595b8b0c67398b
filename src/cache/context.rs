//! Per-session cache wiring.

use std::sync::{Arc, Mutex};

use tracing::{info, warn};
use uuid::Uuid;

use super::channel::{Broadcaster, ChangeFeed, ChannelError};
use super::clock::{Clock, SystemClock};
use super::config::CacheConfig;
use super::consumer::CacheConsumer;
use super::events::EventBus;
use super::listener::{CacheListener, ListenerHandle};
use super::lock::mutex_lock;
use super::storage::KeyValueStorage;
use super::store::TwoTierStore;
use super::trigger::InvalidationService;

const SOURCE: &str = "cache::context";

/// Owns one session's store, bus, consumer, invalidation service and
/// listener.
///
/// Contexts are built explicitly and passed to whoever needs them; two
/// contexts over the same storage and broadcaster behave as two sessions.
pub struct CacheContext {
    session_id: Uuid,
    config: CacheConfig,
    store: Arc<TwoTierStore>,
    bus: Arc<EventBus>,
    consumer: Arc<CacheConsumer>,
    invalidation: Arc<InvalidationService>,
    broadcaster: Arc<dyn Broadcaster>,
    change_feed: Option<Arc<dyn ChangeFeed>>,
    listener: Mutex<Option<ListenerHandle>>,
}

impl CacheContext {
    pub fn new(
        config: CacheConfig,
        storage: Arc<dyn KeyValueStorage>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self::with_clock(config, storage, broadcaster, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: CacheConfig,
        storage: Arc<dyn KeyValueStorage>,
        broadcaster: Arc<dyn Broadcaster>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let session_id = Uuid::new_v4();
        let store = Arc::new(TwoTierStore::new(&config, storage, clock));
        let bus = Arc::new(EventBus::new_with_limit(config.bus_capacity_non_zero()));
        let consumer = Arc::new(CacheConsumer::new(
            config.clone(),
            store.clone(),
            bus.clone(),
        ));
        let invalidation = Arc::new(InvalidationService::new(
            config.clone(),
            session_id,
            bus.clone(),
            consumer.clone(),
            broadcaster.clone(),
        ));

        Self {
            session_id,
            config,
            store,
            bus,
            consumer,
            invalidation,
            broadcaster,
            change_feed: None,
            listener: Mutex::new(None),
        }
    }

    /// Also listen to database table changes once the listener starts.
    pub fn with_change_feed(mut self, feed: Arc<dyn ChangeFeed>) -> Self {
        self.change_feed = Some(feed);
        self
    }

    /// Start the background listener. Calling it again is a no-op.
    pub async fn start_listener(&self) -> Result<(), ChannelError> {
        if self.is_listening() {
            warn!(session_id = %self.session_id, "Cache listener already running");
            return Ok(());
        }

        let listener = CacheListener::new(
            self.session_id,
            self.bus.clone(),
            self.consumer.clone(),
            self.broadcaster.clone(),
            self.change_feed.clone(),
        );
        let handle = listener.start().await?;

        let previous = mutex_lock(&self.listener, SOURCE, "start_listener").replace(handle);
        if let Some(previous) = previous {
            // Lost a race with a concurrent start; keep the newer listener.
            previous.shutdown().await;
        }
        Ok(())
    }

    pub fn is_listening(&self) -> bool {
        mutex_lock(&self.listener, SOURCE, "is_listening")
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the listener and drop pending events. Cached entries stay.
    pub async fn shutdown(&self) {
        let handle = mutex_lock(&self.listener, SOURCE, "shutdown").take();
        if let Some(handle) = handle {
            handle.shutdown().await;
        }
        self.bus.clear();
        info!(session_id = %self.session_id, "Cache context shut down");
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<TwoTierStore> {
        &self.store
    }

    pub fn consumer(&self) -> &Arc<CacheConsumer> {
        &self.consumer
    }

    pub fn invalidation(&self) -> &Arc<InvalidationService> {
        &self.invalidation
    }
}
