//! Paginated orders list view.

use crate::cache::QueryParams;
use crate::domain::dashboard::OrderListPage;
use crate::domain::entities::OrderPage;

use crate::application::error::AppError;

pub const MAX_PAGE_SIZE: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrdersQuery {
    pub year: i32,
    /// 1-based.
    pub page: u32,
    pub page_size: u32,
}

impl OrdersQuery {
    pub fn new(year: i32, page: u32, page_size: u32) -> Self {
        Self {
            year,
            page,
            page_size,
        }
    }

    pub(super) fn validate(&self) -> Result<(), AppError> {
        if self.page == 0 {
            return Err(AppError::validation("page must be at least 1"));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(AppError::validation(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        Ok(())
    }

    pub(super) fn params(&self) -> QueryParams {
        QueryParams::new()
            .with("year", self.year)
            .with("page", self.page)
            .with("page_size", self.page_size)
    }
}

pub fn into_view(query: OrdersQuery, page: OrderPage) -> OrderListPage {
    let total_pages = page
        .total_count
        .div_ceil(u64::from(query.page_size.max(1)));

    OrderListPage {
        year: query.year,
        page: query.page,
        page_size: query.page_size,
        total_count: page.total_count,
        total_pages: u32::try_from(total_pages).unwrap_or(u32::MAX),
        orders: page.items,
    }
}
