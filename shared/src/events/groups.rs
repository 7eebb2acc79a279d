use serde::{Deserialize, Serialize};
use std::fmt;

use super::types::AlertKind;
use crate::ids::{TenantId, VariantId, WarehouseId};

/// Subscription group key. Every emitted event is routed to one or more
/// groups; subscribers attach to a group and receive everything published
/// to it while connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupKey {
    /// Stock changes within one warehouse.
    Warehouse(TenantId, WarehouseId),
    /// Stock changes for one variant across warehouses.
    Variant(TenantId, VariantId),
    /// Alert stream for one alert kind.
    Alerts(TenantId, AlertKind),
    /// Aggregated dashboard metric updates.
    Dashboard(TenantId),
}

impl GroupKey {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            GroupKey::Warehouse(t, _)
            | GroupKey::Variant(t, _)
            | GroupKey::Alerts(t, _)
            | GroupKey::Dashboard(t) => *t,
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Warehouse(t, w) => write!(f, "tenant:{t}:warehouse:{w}"),
            GroupKey::Variant(t, v) => write!(f, "tenant:{t}:variant:{v}"),
            GroupKey::Alerts(t, kind) => write!(f, "tenant:{t}:alerts:{}", kind.as_str()),
            GroupKey::Dashboard(t) => write!(f, "tenant:{t}:dashboard"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_formats() {
        let tenant = TenantId::new();
        let warehouse = WarehouseId::new();

        assert_eq!(
            GroupKey::Warehouse(tenant, warehouse).to_string(),
            format!("tenant:{tenant}:warehouse:{warehouse}")
        );
        assert_eq!(
            GroupKey::Alerts(tenant, AlertKind::LowStock).to_string(),
            format!("tenant:{tenant}:alerts:low_stock")
        );
        assert_eq!(
            GroupKey::Dashboard(tenant).to_string(),
            format!("tenant:{tenant}:dashboard")
        );
    }

    #[test]
    fn test_group_keys_are_distinct_per_tenant() {
        let w = WarehouseId::new();
        let a = GroupKey::Warehouse(TenantId::new(), w);
        let b = GroupKey::Warehouse(TenantId::new(), w);
        assert_ne!(a, b);
    }
}
