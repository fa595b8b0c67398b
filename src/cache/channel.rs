//! Channels that carry invalidations between sessions.
//!
//! A [`Broadcaster`] exchanges [`InvalidationEvent`]s with peer sessions. A
//! [`ChangeFeed`] reports row changes made directly in the database. Both
//! have an in-process implementation here; the Postgres ones live in
//! `infra::notify`.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::domain::types::EntityType;

use super::events::InvalidationEvent;

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Tables whose changes affect cached queries.
pub const WATCHED_TABLES: [&str; 4] = ["orders", "order_items", "invoices", "clients"];

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel connection failed: {0}")]
    Connect(String),
    #[error("failed to publish on channel: {0}")]
    Publish(String),
    #[error("failed to decode channel payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("channel receiver lagged, {0} messages lost")]
    Lagged(u64),
}

pub type EventStream = BoxStream<'static, Result<InvalidationEvent, ChannelError>>;
pub type ChangeStream = BoxStream<'static, Result<TableChange, ChannelError>>;

/// Session-to-session invalidation channel.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn publish(&self, event: &InvalidationEvent) -> Result<(), ChannelError>;

    async fn subscribe(&self) -> Result<EventStream, ChannelError>;
}

/// Feed of row-level changes to the watched tables.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(&self, tables: &[&str]) -> Result<ChangeStream, ChannelError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    #[serde(alias = "INSERT")]
    Insert,
    #[serde(alias = "UPDATE")]
    Update,
    #[serde(alias = "DELETE")]
    Delete,
}

/// Payload emitted by the table change triggers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableChange {
    pub table: String,
    pub operation: ChangeOperation,
    #[serde(default)]
    pub old_id: Option<String>,
    #[serde(default)]
    pub new_id: Option<String>,
}

impl TableChange {
    pub fn entity_type(&self) -> Option<EntityType> {
        EntityType::from_table(&self.table)
    }

    /// Id of the affected row; deletes only carry the old one.
    pub fn entity_id(&self) -> Option<&str> {
        self.new_id.as_deref().or(self.old_id.as_deref())
    }

    /// Invalidation for this change, or `None` for unwatched tables.
    ///
    /// Database-originated events carry the nil origin.
    pub fn into_event(self) -> Option<InvalidationEvent> {
        let entity_type = self.entity_type()?;
        let entity_id = self.entity_id().map(str::to_string);
        Some(InvalidationEvent::new(Uuid::nil(), entity_type, entity_id))
    }
}

fn receiver_stream<T, U>(
    receiver: broadcast::Receiver<T>,
    map: impl Fn(T) -> Option<U> + Send + Sync + 'static,
) -> BoxStream<'static, Result<U, ChannelError>>
where
    T: Clone + Send + 'static,
    U: Send + 'static,
{
    stream::unfold((receiver, map), |(mut receiver, map)| async move {
        loop {
            match receiver.recv().await {
                Ok(message) => match map(message) {
                    Some(item) => return Some((Ok(item), (receiver, map))),
                    None => continue,
                },
                Err(RecvError::Lagged(lost)) => {
                    return Some((Err(ChannelError::Lagged(lost)), (receiver, map)));
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}

/// In-process broadcaster over a tokio broadcast channel.
///
/// Clones share the channel, so each clone acts as one session's handle.
#[derive(Debug, Clone)]
pub struct LocalBroadcaster {
    sender: broadcast::Sender<InvalidationEvent>,
}

impl LocalBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }
}

impl Default for LocalBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broadcaster for LocalBroadcaster {
    async fn publish(&self, event: &InvalidationEvent) -> Result<(), ChannelError> {
        // No subscribers means no peers to notify.
        let _ = self.sender.send(event.clone());
        Ok(())
    }

    async fn subscribe(&self) -> Result<EventStream, ChannelError> {
        Ok(receiver_stream(self.sender.subscribe(), Some))
    }
}

/// In-process change feed; tests and tools push changes with [`emit`].
///
/// [`emit`]: LocalChangeFeed::emit
#[derive(Debug, Clone)]
pub struct LocalChangeFeed {
    sender: broadcast::Sender<TableChange>,
}

impl LocalChangeFeed {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Returns the number of subscribers that received the change.
    pub fn emit(&self, change: TableChange) -> usize {
        self.sender.send(change).unwrap_or(0)
    }
}

impl Default for LocalChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChangeFeed for LocalChangeFeed {
    async fn subscribe(&self, tables: &[&str]) -> Result<ChangeStream, ChannelError> {
        let tables: Vec<String> = tables.iter().map(|table| table.to_string()).collect();
        Ok(receiver_stream(self.sender.subscribe(), move |change: TableChange| {
            tables.contains(&change.table).then_some(change)
        }))
    }
}
