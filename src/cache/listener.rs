//! Background listener feeding remote invalidations into the event bus.

use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::types::EntityType;

use super::channel::{Broadcaster, ChangeFeed, ChannelError, TableChange, WATCHED_TABLES};
use super::consumer::CacheConsumer;
use super::events::{EventBus, EventSource, InvalidationEvent};

enum Incoming {
    Broadcast(Result<InvalidationEvent, ChannelError>),
    Change(Result<TableChange, ChannelError>),
}

/// Subscribes to peer broadcasts and, optionally, database table changes.
///
/// Every received event goes through the same bus and consumer as local
/// invalidations. Events this session published itself are skipped.
pub struct CacheListener {
    session_id: Uuid,
    bus: Arc<EventBus>,
    consumer: Arc<CacheConsumer>,
    broadcaster: Arc<dyn Broadcaster>,
    change_feed: Option<Arc<dyn ChangeFeed>>,
}

impl CacheListener {
    pub fn new(
        session_id: Uuid,
        bus: Arc<EventBus>,
        consumer: Arc<CacheConsumer>,
        broadcaster: Arc<dyn Broadcaster>,
        change_feed: Option<Arc<dyn ChangeFeed>>,
    ) -> Self {
        Self {
            session_id,
            bus,
            consumer,
            broadcaster,
            change_feed,
        }
    }

    /// Subscribe to all sources and spawn the receive loop.
    ///
    /// Subscriptions are in place when this returns, so nothing published
    /// afterwards is missed.
    pub async fn start(self) -> Result<ListenerHandle, ChannelError> {
        let broadcasts = self
            .broadcaster
            .subscribe()
            .await?
            .map(Incoming::Broadcast)
            .boxed();

        let mut incoming: BoxStream<'static, Incoming> = match &self.change_feed {
            Some(feed) => {
                let changes = feed.subscribe(&WATCHED_TABLES).await?.map(Incoming::Change);
                stream::select(broadcasts, changes).boxed()
            }
            None => broadcasts,
        };

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            info!(
                session_id = %self.session_id,
                table_changes = self.change_feed.is_some(),
                "Cache listener started"
            );
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    item = incoming.next() => match item {
                        Some(item) => self.handle(item),
                        None => {
                            warn!("Cache listener sources closed");
                            break;
                        }
                    },
                }
            }
            info!(session_id = %self.session_id, "Cache listener stopped");
        });

        Ok(ListenerHandle { shutdown, task })
    }

    fn handle(&self, incoming: Incoming) {
        match incoming {
            Incoming::Broadcast(Ok(event)) => {
                if event.origin == self.session_id {
                    debug!(event_id = %event.id, "Skipping own broadcast");
                    return;
                }
                self.apply(event, EventSource::Broadcast);
            }
            Incoming::Broadcast(Err(err)) => self.handle_error(err, EventSource::Broadcast),
            Incoming::Change(Ok(change)) => {
                let table = change.table.clone();
                match change.into_event() {
                    Some(event) => self.apply(event, EventSource::TableChange),
                    None => debug!(table = %table, "Ignoring change on unwatched table"),
                }
            }
            Incoming::Change(Err(err)) => self.handle_error(err, EventSource::TableChange),
        }
    }

    fn handle_error(&self, err: ChannelError, source: EventSource) {
        match err {
            ChannelError::Lagged(lost) => {
                // Unknown events were lost; only a full clear is safe.
                warn!(lost, source = %source, "Cache listener lagged, clearing cache");
                let event = InvalidationEvent::new(self.session_id, EntityType::All, None);
                self.apply(event, source);
            }
            other => error!(error = %other, source = %source, "Skipping undeliverable cache event"),
        }
    }

    fn apply(&self, event: InvalidationEvent, source: EventSource) {
        self.bus.publish(event, source);
        self.consumer.consume();
    }
}

/// Handle to a running listener.
///
/// Dropping the handle also stops the listener.
pub struct ListenerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the receive loop and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            error!(error = %err, "Cache listener task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::cache::channel::{ChangeOperation, LocalBroadcaster, LocalChangeFeed};
    use crate::cache::clock::ManualClock;
    use crate::cache::config::CacheConfig;
    use crate::cache::keys::{CacheKey, QueryKind, QueryParams};
    use crate::cache::storage::MemoryStorage;
    use crate::cache::store::TwoTierStore;

    struct Fixture {
        session_id: Uuid,
        store: Arc<TwoTierStore>,
        bus: Arc<EventBus>,
        consumer: Arc<CacheConsumer>,
    }

    fn fixture() -> Fixture {
        let config = CacheConfig::default();
        let store = Arc::new(TwoTierStore::new(
            &config,
            Arc::new(MemoryStorage::new()),
            Arc::new(ManualClock::default()),
        ));
        let bus = Arc::new(EventBus::new());
        let consumer = Arc::new(CacheConsumer::new(config, store.clone(), bus.clone()));
        Fixture {
            session_id: Uuid::new_v4(),
            store,
            bus,
            consumer,
        }
    }

    fn stats_key() -> CacheKey {
        CacheKey::for_query(
            QueryKind::DashboardStats,
            &QueryParams::new().with("year", 2024).with("month", "all"),
        )
    }

    #[tokio::test]
    async fn peer_broadcast_invalidates() {
        let fx = fixture();
        let broadcaster = LocalBroadcaster::new();
        let listener = CacheListener::new(
            fx.session_id,
            fx.bus.clone(),
            fx.consumer.clone(),
            Arc::new(broadcaster.clone()),
            None,
        );
        let handle = listener.start().await.expect("start");
        let mut generation = fx.consumer.subscribe();
        fx.store.set(&stats_key(), json!({"totals": {}}));

        let event = InvalidationEvent::new(Uuid::new_v4(), EntityType::Client, None);
        broadcaster.publish(&event).await.expect("publish");
        generation.changed().await.expect("generation bump");

        assert!(fx.store.get(&stats_key()).is_none());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn own_broadcast_is_skipped() {
        let fx = fixture();
        let broadcaster = LocalBroadcaster::new();
        let listener = CacheListener::new(
            fx.session_id,
            fx.bus.clone(),
            fx.consumer.clone(),
            Arc::new(broadcaster.clone()),
            None,
        );
        let handle = listener.start().await.expect("start");
        fx.store.set(&stats_key(), json!({"totals": {}}));

        let own = InvalidationEvent::new(fx.session_id, EntityType::Order, None);
        broadcaster.publish(&own).await.expect("publish");
        // A peer event afterwards proves the own event was already handled.
        let mut generation = fx.consumer.subscribe();
        let peer = InvalidationEvent::new(Uuid::new_v4(), EntityType::Invoice, None);
        broadcaster.publish(&peer).await.expect("publish");
        generation.changed().await.expect("generation bump");

        assert_eq!(fx.consumer.generation(), 1);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn table_change_invalidates() {
        let fx = fixture();
        let feed = LocalChangeFeed::new();
        let listener = CacheListener::new(
            fx.session_id,
            fx.bus.clone(),
            fx.consumer.clone(),
            Arc::new(LocalBroadcaster::new()),
            Some(Arc::new(feed.clone())),
        );
        let handle = listener.start().await.expect("start");
        let mut generation = fx.consumer.subscribe();
        fx.store.set(&stats_key(), json!({"totals": {}}));

        feed.emit(TableChange {
            table: "invoices".into(),
            operation: ChangeOperation::Update,
            old_id: Some("inv-1".into()),
            new_id: Some("inv-1".into()),
        });
        generation.changed().await.expect("generation bump");

        assert!(fx.store.get(&stats_key()).is_none());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_the_task() {
        let fx = fixture();
        let listener = CacheListener::new(
            fx.session_id,
            fx.bus,
            fx.consumer,
            Arc::new(LocalBroadcaster::new()),
            None,
        );
        let handle = listener.start().await.expect("start");
        assert!(!handle.is_finished());
        handle.shutdown().await;
    }
}
