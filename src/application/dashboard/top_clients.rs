//! Top clients by revenue.

use crate::cache::QueryParams;
use crate::domain::dashboard::TopClient;
use crate::domain::entities::TopClientRecord;

use crate::application::error::AppError;

pub const MAX_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopClientsQuery {
    pub year: i32,
    pub limit: u32,
}

impl TopClientsQuery {
    pub fn new(year: i32, limit: u32) -> Self {
        Self { year, limit }
    }

    pub(super) fn validate(&self) -> Result<(), AppError> {
        if self.limit == 0 || self.limit > MAX_LIMIT {
            return Err(AppError::validation(format!(
                "limit must be between 1 and {MAX_LIMIT}, got {}",
                self.limit
            )));
        }
        Ok(())
    }

    pub(super) fn params(&self) -> QueryParams {
        QueryParams::new()
            .with("year", self.year)
            .with("limit", self.limit)
    }
}

/// Rank the records and compute each client's share of the listed revenue.
pub fn rank(records: Vec<TopClientRecord>) -> Vec<TopClient> {
    let total: f64 = records.iter().map(|record| record.revenue).sum();

    records
        .into_iter()
        .zip(1u32..)
        .map(|(record, rank)| {
            let share_percent = if total > 0.0 {
                round2(record.revenue / total * 100.0)
            } else {
                0.0
            };
            TopClient {
                rank,
                client_id: record.client_id,
                name: record.client_name,
                order_count: record.order_count,
                revenue: record.revenue,
                share_percent,
            }
        })
        .collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
