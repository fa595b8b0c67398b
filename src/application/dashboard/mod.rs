//! Cached dashboard queries.
//!
//! Each query consults the two-tier store first. On a miss it runs the
//! aggregate through [`StatsRepo`], shapes the result and stores it in both
//! tiers before returning it.

mod orders;
mod palette;
mod stats;
mod top_clients;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use crate::application::error::AppError;
use crate::application::repos::StatsRepo;
use crate::cache::{CacheKey, QueryKind, QueryParams, TwoTierStore};
use crate::domain::dashboard::{DashboardStats, OrderListPage, TopClient};

pub use orders::{MAX_PAGE_SIZE, OrdersQuery};
pub use palette::team_color;
pub use stats::{StatsQuery, normalize};
pub use top_clients::{MAX_LIMIT, TopClientsQuery, rank};

const METRIC_DASHBOARD_FETCH_MS: &str = "bizdash_dashboard_fetch_ms";

#[derive(Clone)]
pub struct DashboardService {
    repo: Arc<dyn StatsRepo>,
    store: Arc<TwoTierStore>,
}

impl DashboardService {
    pub fn new(repo: Arc<dyn StatsRepo>, store: Arc<TwoTierStore>) -> Self {
        Self { repo, store }
    }

    #[instrument(skip(self))]
    pub async fn dashboard_stats(&self, query: StatsQuery) -> Result<DashboardStats, AppError> {
        query.validate()?;
        self.cached(QueryKind::DashboardStats, &query.params(), || async {
            let raw = self
                .repo
                .dashboard_stats(query.year, query.month.month())
                .await?;
            Ok(normalize(query, raw))
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn orders_list(&self, query: OrdersQuery) -> Result<OrderListPage, AppError> {
        query.validate()?;
        self.cached(QueryKind::OrdersList, &query.params(), || async {
            let page = self
                .repo
                .list_orders(query.year, query.page, query.page_size)
                .await?;
            Ok(orders::into_view(query, page))
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn top_clients(&self, query: TopClientsQuery) -> Result<Vec<TopClient>, AppError> {
        query.validate()?;
        self.cached(QueryKind::TopClients, &query.params(), || async {
            let records = self.repo.top_clients(query.year, query.limit).await?;
            Ok(rank(records))
        })
        .await
    }

    async fn cached<T, F, Fut>(
        &self,
        kind: QueryKind,
        params: &QueryParams,
        fetch: F,
    ) -> Result<T, AppError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let key = CacheKey::for_query(kind, params);

        if let Some(value) = self.store.get(&key) {
            match serde_json::from_value::<T>(value) {
                Ok(hit) => {
                    debug!(cache_key = %key, "Dashboard cache hit");
                    return Ok(hit);
                }
                Err(err) => {
                    warn!(cache_key = %key, error = %err, "Discarding undecodable cache entry");
                    self.store.remove(&key);
                }
            }
        }

        let started_at = Instant::now();
        let value = fetch().await?;
        histogram!(METRIC_DASHBOARD_FETCH_MS, "query" => kind.as_str())
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        match serde_json::to_value(&value) {
            Ok(json) => self.store.set(&key, json),
            Err(err) => warn!(cache_key = %key, error = %err, "Failed to encode query result"),
        }
        debug!(cache_key = %key, "Dashboard cache populated");

        Ok(value)
    }
}
