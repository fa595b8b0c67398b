//! Domain records mirrored from the aggregate queries the dashboard runs.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::OrderStatus;

/// Result of the server-side `dashboard_stats` function.
///
/// The function returns a single jsonb document; months and teams come back
/// sparse (only buckets with data are present).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawDashboardStats {
    pub total_orders: i64,
    pub total_revenue: f64,
    pub active_clients: i64,
    pub outstanding_invoices: i64,
    pub outstanding_amount: f64,
    pub monthly: Vec<MonthlyAggregate>,
    pub teams: Vec<TeamAggregate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyAggregate {
    pub month: i32,
    pub orders: i64,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamAggregate {
    /// `None` for orders not assigned to any team.
    pub team: Option<String>,
    pub orders: i64,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopClientRecord {
    pub client_id: Uuid,
    pub client_name: String,
    pub order_count: i64,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: Uuid,
    pub number: String,
    pub client_id: Uuid,
    pub client_name: String,
    pub team_name: Option<String>,
    pub status: OrderStatus,
    pub total: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub ordered_at: OffsetDateTime,
}

/// One page of orders together with the unpaginated row count.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OrderPage {
    pub items: Vec<OrderRecord>,
    pub total_count: u64,
}
