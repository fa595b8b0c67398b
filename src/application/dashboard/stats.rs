//! Dashboard statistics view.

use crate::application::error::AppError;
use crate::cache::QueryParams;
use crate::domain::dashboard::{DashboardStats, DashboardTotals, MonthlyPoint, TeamBucket};
use crate::domain::entities::RawDashboardStats;
use crate::domain::types::MonthFilter;

use super::palette::team_color;

const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];
const UNASSIGNED_TEAM: &str = "Unassigned";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsQuery {
    pub year: i32,
    pub month: MonthFilter,
}

impl StatsQuery {
    pub fn new(year: i32, month: MonthFilter) -> Self {
        Self { year, month }
    }

    pub(super) fn validate(&self) -> Result<(), AppError> {
        if let MonthFilter::Month(month) = self.month {
            MonthFilter::new(month)?;
        }
        Ok(())
    }

    pub(super) fn params(&self) -> QueryParams {
        let params = QueryParams::new().with("year", self.year);
        match self.month {
            MonthFilter::All => params.with("month", "all"),
            MonthFilter::Month(month) => params.with("month", month),
        }
    }
}

/// Shape the raw aggregate into the view.
///
/// The monthly series always has twelve points; months without orders are
/// zero and out-of-range months are dropped. Teams are ordered by revenue,
/// highest first, ties broken by name.
pub fn normalize(query: StatsQuery, raw: RawDashboardStats) -> DashboardStats {
    let mut monthly: Vec<MonthlyPoint> = MONTH_LABELS
        .iter()
        .zip(1u8..)
        .map(|(label, month)| MonthlyPoint {
            month,
            label: (*label).to_string(),
            orders: 0,
            revenue: 0.0,
        })
        .collect();
    for aggregate in raw.monthly {
        if !(1..=12).contains(&aggregate.month) {
            continue;
        }
        if let Some(point) = usize::try_from(aggregate.month - 1)
            .ok()
            .and_then(|index| monthly.get_mut(index))
        {
            point.orders += aggregate.orders;
            point.revenue += aggregate.revenue;
        }
    }

    let mut teams: Vec<TeamBucket> = raw
        .teams
        .into_iter()
        .map(|aggregate| {
            let team = aggregate
                .team
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| UNASSIGNED_TEAM.to_string());
            TeamBucket {
                color: team_color(&team).to_string(),
                team,
                orders: aggregate.orders,
                revenue: aggregate.revenue,
            }
        })
        .collect();
    teams.sort_by(|a, b| {
        b.revenue
            .total_cmp(&a.revenue)
            .then_with(|| a.team.cmp(&b.team))
    });

    let average_order_value = if raw.total_orders > 0 {
        raw.total_revenue / raw.total_orders as f64
    } else {
        0.0
    };

    DashboardStats {
        year: query.year,
        month: query.month.month(),
        totals: DashboardTotals {
            orders: raw.total_orders,
            revenue: raw.total_revenue,
            active_clients: raw.active_clients,
            outstanding_invoices: raw.outstanding_invoices,
            outstanding_amount: raw.outstanding_amount,
            average_order_value,
        },
        monthly,
        teams,
    }
}
