use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_shared::events::{AlertKind, AlertSeverity};
use stockbook_shared::ids::{ActorId, AlertId, TenantId, VariantId, WarehouseId};

/// Derived alert record. Raised by the commit path (threshold crossings)
/// and the background detector (expiry conditions); cleared by operator
/// acknowledgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub tenant_id: TenantId,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub variant_id: Option<VariantId>,
    pub warehouse_id: Option<WarehouseId>,
    pub message: String,
    pub data: serde_json::Value,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<ActorId>,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        tenant_id: TenantId,
        kind: AlertKind,
        severity: AlertSeverity,
        variant_id: Option<VariantId>,
        warehouse_id: Option<WarehouseId>,
        message: String,
        data: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AlertId::new(),
            tenant_id,
            kind,
            severity,
            variant_id,
            warehouse_id,
            message,
            data,
            acknowledged_at: None,
            acknowledged_by: None,
            created_at: now,
        }
    }

    pub fn is_open(&self) -> bool {
        self.acknowledged_at.is_none()
    }

    pub fn acknowledge(&mut self, actor: ActorId, now: DateTime<Utc>) {
        self.acknowledged_at = Some(now);
        self.acknowledged_by = Some(actor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acknowledge_closes_alert() {
        let mut alert = Alert::new(
            TenantId::new(),
            AlertKind::OutOfStock,
            AlertSeverity::Critical,
            Some(VariantId::new()),
            Some(WarehouseId::new()),
            "out of stock".into(),
            serde_json::json!({}),
            Utc::now(),
        );
        assert!(alert.is_open());

        alert.acknowledge(ActorId::new(), Utc::now());
        assert!(!alert.is_open());
    }
}
