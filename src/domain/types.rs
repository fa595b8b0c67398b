//! Shared domain enumerations aligned with persisted database enums.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;

/// Record families whose changes invalidate cached dashboard data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Order,
    Invoice,
    Client,
    All,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Order => "order",
            EntityType::Invoice => "invoice",
            EntityType::Client => "client",
            EntityType::All => "all",
        }
    }

    /// Resolve the entity family a changed table belongs to.
    ///
    /// Tables the dashboard does not aggregate over yield `None`.
    pub fn from_table(table: &str) -> Option<Self> {
        match table {
            "orders" | "order_items" => Some(EntityType::Order),
            "invoices" => Some(EntityType::Invoice),
            "clients" => Some(EntityType::Client),
            _ => None,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "order" | "orders" => Ok(EntityType::Order),
            "invoice" | "invoices" => Ok(EntityType::Invoice),
            "client" | "clients" => Ok(EntityType::Client),
            "all" => Ok(EntityType::All),
            other => Err(DomainError::validation(format!(
                "unknown entity type `{other}`"
            ))),
        }
    }
}

/// Month selector for the statistics view: the whole year or a single month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MonthFilter {
    #[default]
    All,
    Month(u8),
}

impl MonthFilter {
    pub fn new(month: u8) -> Result<Self, DomainError> {
        if (1..=12).contains(&month) {
            Ok(MonthFilter::Month(month))
        } else {
            Err(DomainError::validation(format!(
                "month must be between 1 and 12, got {month}"
            )))
        }
    }

    pub fn month(self) -> Option<u8> {
        match self {
            MonthFilter::All => None,
            MonthFilter::Month(month) => Some(month),
        }
    }
}

impl fmt::Display for MonthFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonthFilter::All => f.write_str("all"),
            MonthFilter::Month(month) => write!(f, "{month}"),
        }
    }
}

impl FromStr for MonthFilter {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(MonthFilter::All);
        }
        let month: u8 = trimmed
            .parse()
            .map_err(|_| DomainError::validation(format!("invalid month `{trimmed}`")))?;
        MonthFilter::new(month)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_type_maps_tables() {
        assert_eq!(EntityType::from_table("orders"), Some(EntityType::Order));
        assert_eq!(
            EntityType::from_table("order_items"),
            Some(EntityType::Order)
        );
        assert_eq!(
            EntityType::from_table("invoices"),
            Some(EntityType::Invoice)
        );
        assert_eq!(EntityType::from_table("clients"), Some(EntityType::Client));
        assert_eq!(EntityType::from_table("commodities"), None);
    }

    #[test]
    fn entity_type_parses_cli_spellings() {
        assert_eq!("Orders".parse::<EntityType>().ok(), Some(EntityType::Order));
        assert_eq!("all".parse::<EntityType>().ok(), Some(EntityType::All));
        assert!("teams".parse::<EntityType>().is_err());
    }

    #[test]
    fn entity_type_serializes_snake_case() {
        let json = serde_json::to_string(&EntityType::Invoice).expect("serialize");
        assert_eq!(json, "\"invoice\"");
    }

    #[test]
    fn month_filter_parses_and_validates() {
        assert_eq!("all".parse::<MonthFilter>().ok(), Some(MonthFilter::All));
        assert_eq!("3".parse::<MonthFilter>().ok(), Some(MonthFilter::Month(3)));
        assert!("13".parse::<MonthFilter>().is_err());
        assert!("0".parse::<MonthFilter>().is_err());
        assert!("march".parse::<MonthFilter>().is_err());
    }

    #[test]
    fn month_filter_display_matches_parse() {
        assert_eq!(MonthFilter::All.to_string(), "all");
        assert_eq!(MonthFilter::Month(11).to_string(), "11");
    }
}
