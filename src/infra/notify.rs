//! Postgres `LISTEN/NOTIFY` channels for cache invalidation.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::de::DeserializeOwned;
use sqlx::postgres::{PgListener, PgPool};
use tracing::{debug, info, warn};

use crate::cache::{
    Broadcaster, ChangeFeed, ChangeStream, ChannelError, EventStream, InvalidationEvent,
    TableChange,
};

/// Broadcasts invalidations to every session connected to the same database.
#[derive(Clone)]
pub struct PgBroadcaster {
    pool: PgPool,
    channel: String,
}

impl PgBroadcaster {
    pub fn new(pool: PgPool, channel: impl Into<String>) -> Self {
        Self {
            pool,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl Broadcaster for PgBroadcaster {
    async fn publish(&self, event: &InvalidationEvent) -> Result<(), ChannelError> {
        let payload = serde_json::to_string(event)?;
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(&self.channel)
            .bind(&payload)
            .execute(&self.pool)
            .await
            .map_err(|err| ChannelError::Publish(err.to_string()))?;

        debug!(
            channel = %self.channel,
            event_id = %event.id,
            entity_type = %event.entity_type,
            "Published cache invalidation"
        );
        Ok(())
    }

    async fn subscribe(&self) -> Result<EventStream, ChannelError> {
        let listener = listen(&self.pool, &self.channel).await?;
        Ok(notification_stream::<InvalidationEvent>(listener).boxed())
    }
}

/// Row changes reported by the `bizdash_notify_table_change` trigger.
#[derive(Clone)]
pub struct PgChangeFeed {
    pool: PgPool,
    channel: String,
}

impl PgChangeFeed {
    pub fn new(pool: PgPool, channel: impl Into<String>) -> Self {
        Self {
            pool,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl ChangeFeed for PgChangeFeed {
    async fn subscribe(&self, tables: &[&str]) -> Result<ChangeStream, ChannelError> {
        let listener = listen(&self.pool, &self.channel).await?;
        let tables: Vec<String> = tables.iter().map(|table| table.to_string()).collect();

        Ok(notification_stream::<TableChange>(listener)
            .filter(move |item| {
                let keep = match item {
                    Ok(change) => tables.contains(&change.table),
                    Err(_) => true,
                };
                futures::future::ready(keep)
            })
            .boxed())
    }
}

async fn listen(pool: &PgPool, channel: &str) -> Result<PgListener, ChannelError> {
    let mut listener = PgListener::connect_with(pool)
        .await
        .map_err(|err| ChannelError::Connect(err.to_string()))?;
    listener
        .listen(channel)
        .await
        .map_err(|err| ChannelError::Connect(err.to_string()))?;

    info!(channel, "Listening for notifications");
    Ok(listener)
}

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Decode notification payloads as `T`.
///
/// The stream never ends on its own. When the connection drops or the
/// listener fails, notifications sent before it reconnects are lost; that
/// gap surfaces as `ChannelError::Lagged(0)` and the next poll reconnects.
fn notification_stream<T>(
    listener: PgListener,
) -> impl futures::Stream<Item = Result<T, ChannelError>> + Send + 'static
where
    T: DeserializeOwned + Send + 'static,
{
    stream::unfold(listener, |mut listener| async move {
        let received = listener.try_recv().await;
        let failed = received.is_err();
        let item = decode_received::<T>(
            received
                .as_ref()
                .map(|notification| notification.as_ref().map(|n| n.payload())),
        );
        if failed {
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
        Some((item, listener))
    })
}

fn decode_received<T: DeserializeOwned>(
    received: Result<Option<&str>, &sqlx::Error>,
) -> Result<T, ChannelError> {
    match received {
        Ok(Some(payload)) => serde_json::from_str::<T>(payload).map_err(ChannelError::from),
        Ok(None) => {
            warn!("Notification connection lost, reconnecting");
            Err(ChannelError::Lagged(0))
        }
        Err(err) => {
            warn!(error = %err, "Notification listener failed, retrying");
            Err(ChannelError::Lagged(0))
        }
    }
}
