#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bizdash::application::dashboard::DashboardService;
use bizdash::application::repos::{RepoError, StatsRepo};
use bizdash::cache::{
    CacheConfig, CacheContext, Clock, KeyValueStorage, LocalBroadcaster, ManualClock,
    MemoryStorage,
};
use bizdash::domain::entities::{
    MonthlyAggregate, OrderPage, OrderRecord, RawDashboardStats, TeamAggregate, TopClientRecord,
};
use bizdash::domain::types::OrderStatus;
use time::macros::datetime;
use uuid::Uuid;

/// Stats repository returning canned data and counting calls per query.
#[derive(Default)]
pub struct FakeStatsRepo {
    pub stats_calls: AtomicUsize,
    pub top_clients_calls: AtomicUsize,
    pub orders_calls: AtomicUsize,
    failing: AtomicBool,
}

impl FakeStatsRepo {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn stats_calls(&self) -> usize {
        self.stats_calls.load(Ordering::SeqCst)
    }

    pub fn top_clients_calls(&self) -> usize {
        self.top_clients_calls.load(Ordering::SeqCst)
    }

    pub fn orders_calls(&self) -> usize {
        self.orders_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), RepoError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(RepoError::from_persistence("connection refused"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StatsRepo for FakeStatsRepo {
    async fn dashboard_stats(
        &self,
        year: i32,
        month: Option<u8>,
    ) -> Result<RawDashboardStats, RepoError> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;

        let months: Vec<i32> = match month {
            Some(month) => vec![i32::from(month)],
            None => vec![1, 3],
        };
        let monthly: Vec<MonthlyAggregate> = months
            .into_iter()
            .map(|month| MonthlyAggregate {
                month,
                orders: 2,
                revenue: 150.0 + f64::from(year - 2024),
            })
            .collect();
        let total_orders: i64 = monthly.iter().map(|point| point.orders).sum();
        let total_revenue: f64 = monthly.iter().map(|point| point.revenue).sum();

        Ok(RawDashboardStats {
            total_orders,
            total_revenue,
            active_clients: 2,
            outstanding_invoices: 1,
            outstanding_amount: 40.0,
            monthly,
            teams: vec![
                TeamAggregate {
                    team: Some("North".to_string()),
                    orders: total_orders - 1,
                    revenue: total_revenue - 50.0,
                },
                TeamAggregate {
                    team: None,
                    orders: 1,
                    revenue: 50.0,
                },
            ],
        })
    }

    async fn top_clients(&self, _year: i32, limit: u32) -> Result<Vec<TopClientRecord>, RepoError> {
        self.top_clients_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;

        let records = vec![
            TopClientRecord {
                client_id: Uuid::from_u128(1),
                client_name: "Acme".to_string(),
                order_count: 3,
                revenue: 300.0,
            },
            TopClientRecord {
                client_id: Uuid::from_u128(2),
                client_name: "Globex".to_string(),
                order_count: 1,
                revenue: 100.0,
            },
        ];
        Ok(records.into_iter().take(limit as usize).collect())
    }

    async fn list_orders(
        &self,
        _year: i32,
        page: u32,
        page_size: u32,
    ) -> Result<OrderPage, RepoError> {
        self.orders_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;

        let items = (0..page_size.min(2))
            .map(|index| OrderRecord {
                id: Uuid::from_u128(u128::from(page * 100 + index)),
                number: format!("ORD-{page}-{index}"),
                client_id: Uuid::from_u128(1),
                client_name: "Acme".to_string(),
                team_name: Some("North".to_string()),
                status: OrderStatus::Confirmed,
                total: 75.0,
                ordered_at: datetime!(2024-03-05 10:00 UTC),
            })
            .collect();
        Ok(OrderPage {
            items,
            total_count: 5,
        })
    }
}

/// One dashboard session over shared storage and a shared broadcaster.
pub struct Session {
    pub cache: CacheContext,
    pub service: DashboardService,
    pub repo: Arc<FakeStatsRepo>,
}

pub fn session(
    config: CacheConfig,
    storage: Arc<dyn KeyValueStorage>,
    broadcaster: Arc<LocalBroadcaster>,
    clock: Arc<dyn Clock>,
) -> Session {
    let repo = FakeStatsRepo::new();
    let cache = CacheContext::with_clock(config, storage, broadcaster, clock);
    let stats_repo: Arc<dyn StatsRepo> = repo.clone();
    let service = DashboardService::new(stats_repo, cache.store().clone());
    Session {
        cache,
        service,
        repo,
    }
}

pub fn single_session() -> (Session, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(datetime!(2024-06-01 12:00 UTC)));
    let session = session(
        CacheConfig::default(),
        Arc::new(MemoryStorage::new()),
        Arc::new(LocalBroadcaster::new()),
        clock.clone(),
    );
    (session, clock)
}
