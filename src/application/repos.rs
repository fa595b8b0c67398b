//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::{OrderPage, RawDashboardStats, TopClientRecord};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("failed to decode query result: {message}")]
    Decode { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }
}

/// Aggregate queries backing the dashboard views.
#[async_trait]
pub trait StatsRepo: Send + Sync {
    /// Totals, the sparse monthly series and team buckets for a year,
    /// optionally restricted to one month.
    async fn dashboard_stats(
        &self,
        year: i32,
        month: Option<u8>,
    ) -> Result<RawDashboardStats, RepoError>;

    /// Clients ordered by revenue for the year, highest first.
    async fn top_clients(&self, year: i32, limit: u32) -> Result<Vec<TopClientRecord>, RepoError>;

    /// Orders placed in the year, newest first. `page` starts at 1.
    async fn list_orders(
        &self,
        year: i32,
        page: u32,
        page_size: u32,
    ) -> Result<OrderPage, RepoError>;
}
