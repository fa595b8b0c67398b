//! Which cached queries depend on which record families.

use crate::domain::types::EntityType;

use super::keys::QueryKind;

/// Query kinds whose cached results must be dropped when `entity` changes.
pub fn dependents(entity: EntityType) -> &'static [QueryKind] {
    match entity {
        EntityType::Order => &[
            QueryKind::DashboardStats,
            QueryKind::OrdersList,
            QueryKind::TopClients,
        ],
        EntityType::Invoice => &[QueryKind::DashboardStats],
        EntityType::Client => &[QueryKind::DashboardStats, QueryKind::TopClients],
        EntityType::All => &QueryKind::ALL,
    }
}

/// Whether results of `kind` are derived from records of `entity`.
pub fn depends_on(kind: QueryKind, entity: EntityType) -> bool {
    dependents(entity).contains(&kind)
}
