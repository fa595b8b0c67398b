//! Presentation shapes produced by the dashboard queries.
//!
//! These are the values stored in the cache, so every type round-trips
//! through JSON.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::entities::OrderRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub year: i32,
    /// `None` when the whole year is selected.
    pub month: Option<u8>,
    pub totals: DashboardTotals,
    /// Always twelve points, January first.
    pub monthly: Vec<MonthlyPoint>,
    pub teams: Vec<TeamBucket>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DashboardTotals {
    pub orders: i64,
    pub revenue: f64,
    pub active_clients: i64,
    pub outstanding_invoices: i64,
    pub outstanding_amount: f64,
    pub average_order_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyPoint {
    pub month: u8,
    pub label: String,
    pub orders: i64,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamBucket {
    pub team: String,
    pub orders: i64,
    pub revenue: f64,
    /// Hex color, stable for a given team name.
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderListPage {
    pub year: i32,
    pub page: u32,
    pub page_size: u32,
    pub total_count: u64,
    pub total_pages: u32,
    pub orders: Vec<OrderRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopClient {
    pub rank: u32,
    pub client_id: Uuid,
    pub name: String,
    pub order_count: i64,
    pub revenue: f64,
    /// Share of the listed clients' combined revenue, 0–100.
    pub share_percent: f64,
}
