//! Invalidation service.
//!
//! Write paths call one of the named operations after a successful mutation.
//! The event is applied locally right away and then broadcast to peer
//! sessions.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::types::EntityType;

use super::channel::Broadcaster;
use super::config::CacheConfig;
use super::consumer::{CacheConsumer, ConsumeOutcome};
use super::events::{EventBus, EventSource, InvalidationEvent};

/// Publishes invalidations for changed records.
///
/// ```ignore
/// // After an order was saved:
/// service.invalidate_order_cache(Some(&order.id.to_string())).await;
/// ```
pub struct InvalidationService {
    config: CacheConfig,
    session_id: Uuid,
    bus: Arc<EventBus>,
    consumer: Arc<CacheConsumer>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl InvalidationService {
    pub fn new(
        config: CacheConfig,
        session_id: Uuid,
        bus: Arc<EventBus>,
        consumer: Arc<CacheConsumer>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self {
            config,
            session_id,
            bus,
            consumer,
            broadcaster,
        }
    }

    /// Drop entries depending on `entity_type` and tell peer sessions.
    ///
    /// Broadcast failures are logged; the local invalidation stands.
    pub async fn invalidate(
        &self,
        entity_type: EntityType,
        entity_id: Option<&str>,
    ) -> InvalidationEvent {
        let event = InvalidationEvent::new(
            self.session_id,
            entity_type,
            entity_id.map(str::to_string),
        );

        if self.config.is_enabled() {
            self.bus.publish(event.clone(), EventSource::Local);
            let ConsumeOutcome { removed, .. } = self.consumer.consume();
            debug!(
                event_id = %event.id,
                entity_type = %entity_type,
                removed,
                "Local invalidation applied"
            );
        } else {
            debug!(
                event_id = %event.id,
                entity_type = %entity_type,
                "Local invalidation skipped: cache disabled"
            );
        }

        if let Err(error) = self.broadcaster.publish(&event).await {
            warn!(
                event_id = %event.id,
                entity_type = %entity_type,
                error = %error,
                "Failed to broadcast cache invalidation"
            );
        }

        event
    }

    pub async fn invalidate_order_cache(&self, order_id: Option<&str>) -> InvalidationEvent {
        self.invalidate(EntityType::Order, order_id).await
    }

    pub async fn invalidate_invoice_cache(&self, invoice_id: Option<&str>) -> InvalidationEvent {
        self.invalidate(EntityType::Invoice, invoice_id).await
    }

    pub async fn invalidate_client_cache(&self, client_id: Option<&str>) -> InvalidationEvent {
        self.invalidate(EntityType::Client, client_id).await
    }

    pub async fn invalidate_all_cache(&self) -> InvalidationEvent {
        self.invalidate(EntityType::All, None).await
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }
}
