use async_trait::async_trait;
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{RepoError, StatsRepo},
    domain::entities::{OrderPage, OrderRecord, RawDashboardStats, TopClientRecord},
    domain::types::OrderStatus,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct TopClientRow {
    client_id: Uuid,
    client_name: String,
    order_count: i64,
    revenue: f64,
}

impl From<TopClientRow> for TopClientRecord {
    fn from(row: TopClientRow) -> Self {
        Self {
            client_id: row.client_id,
            client_name: row.client_name,
            order_count: row.order_count,
            revenue: row.revenue,
        }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    number: String,
    client_id: Uuid,
    client_name: String,
    team_name: Option<String>,
    status: OrderStatus,
    total: f64,
    ordered_at: OffsetDateTime,
}

impl From<OrderRow> for OrderRecord {
    fn from(row: OrderRow) -> Self {
        Self {
            id: row.id,
            number: row.number,
            client_id: row.client_id,
            client_name: row.client_name,
            team_name: row.team_name,
            status: row.status,
            total: row.total,
            ordered_at: row.ordered_at,
        }
    }
}

#[async_trait]
impl StatsRepo for PostgresRepositories {
    async fn dashboard_stats(
        &self,
        year: i32,
        month: Option<u8>,
    ) -> Result<RawDashboardStats, RepoError> {
        let (Json(stats),): (Json<RawDashboardStats>,) =
            sqlx::query_as("SELECT dashboard_stats($1, $2)")
                .bind(year)
                .bind(month.map(i32::from))
                .fetch_one(self.pool())
                .await
                .map_err(map_sqlx_error)?;

        Ok(stats)
    }

    async fn top_clients(&self, year: i32, limit: u32) -> Result<Vec<TopClientRecord>, RepoError> {
        let rows = sqlx::query_as::<_, TopClientRow>(
            r#"
            SELECT client_id, client_name, order_count, revenue
            FROM top_clients($1, $2)
            "#,
        )
        .bind(year)
        .bind(i32::try_from(limit).unwrap_or(i32::MAX))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(TopClientRecord::from).collect())
    }

    async fn list_orders(
        &self,
        year: i32,
        page: u32,
        page_size: u32,
    ) -> Result<OrderPage, RepoError> {
        let (total,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM orders
            WHERE EXTRACT(YEAR FROM ordered_at)::int = $1
            "#,
        )
        .bind(year)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let offset = i64::from(page.saturating_sub(1)) * i64::from(page_size);
        let rows = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT o.id, o.number, o.client_id, c.name AS client_name,
                   t.name AS team_name, o.status, o.total::float8 AS total, o.ordered_at
            FROM orders o
            INNER JOIN clients c ON c.id = o.client_id
            LEFT JOIN teams t ON t.id = o.team_id
            WHERE EXTRACT(YEAR FROM o.ordered_at)::int = $1
            ORDER BY o.ordered_at DESC, o.number DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(year)
        .bind(i64::from(page_size))
        .bind(offset)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(OrderPage {
            items: rows.into_iter().map(OrderRecord::from).collect(),
            total_count: Self::convert_count(total)?,
        })
    }
}
