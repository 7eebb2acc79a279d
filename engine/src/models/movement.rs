use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_shared::events::MovementKind;
use stockbook_shared::ids::{ActorId, InventoryItemId, MovementId, TenantId, VariantId, WarehouseId};
use stockbook_shared::metadata::MovementMetadata;
use stockbook_shared::quantity::Quantity;

/// One immutable ledger entry. Movements are append-only: nothing in the
/// engine updates or deletes a movement once committed. Ordering within an
/// item is `(timestamp_utc, seq)`; `seq` is the item's insertion counter
/// and breaks ties when two movements in one transaction share a
/// timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub variant_id: VariantId,
    pub warehouse_id: WarehouseId,
    pub kind: MovementKind,
    /// Signed quantity: positive inbound, negative outbound.
    pub quantity: Quantity,
    /// The projection's total immediately after this movement.
    pub running_balance: Quantity,
    pub actor_id: ActorId,
    pub timestamp_utc: DateTime<Utc>,
    pub seq: u64,
    pub reason: String,
    pub reference_number: Option<String>,
    pub metadata: MovementMetadata,
}

impl StockMovement {
    /// Ordering key within one item's ledger.
    pub fn order_key(&self) -> (DateTime<Utc>, u64) {
        (self.timestamp_utc, self.seq)
    }
}

/// Query filter for movement-history reads. All fields are conjunctive.
#[derive(Debug, Clone, Default)]
pub struct MovementFilter {
    pub kind: Option<MovementKind>,
    pub reference_number: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl MovementFilter {
    pub fn matches(&self, movement: &StockMovement) -> bool {
        if let Some(kind) = self.kind {
            if movement.kind != kind {
                return false;
            }
        }
        if let Some(ref reference) = self.reference_number {
            if movement.reference_number.as_deref() != Some(reference.as_str()) {
                return false;
            }
        }
        if let Some(from) = self.from {
            if movement.timestamp_utc < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if movement.timestamp_utc >= to {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movement(kind: MovementKind, reference: Option<&str>) -> StockMovement {
        StockMovement {
            id: MovementId::new(),
            tenant_id: TenantId::new(),
            item_id: InventoryItemId::new(),
            variant_id: VariantId::new(),
            warehouse_id: WarehouseId::new(),
            kind,
            quantity: Quantity::from_units(5),
            running_balance: Quantity::from_units(5),
            actor_id: ActorId::new(),
            timestamp_utc: Utc::now(),
            seq: 0,
            reason: "test".into(),
            reference_number: reference.map(String::from),
            metadata: MovementMetadata::new(),
        }
    }

    #[test]
    fn test_filter_by_kind_and_reference() {
        let purchase = movement(MovementKind::Purchase, Some("PO-1"));

        let filter = MovementFilter {
            kind: Some(MovementKind::Purchase),
            reference_number: Some("PO-1".into()),
            ..Default::default()
        };
        assert!(filter.matches(&purchase));

        let filter = MovementFilter {
            kind: Some(MovementKind::Sale),
            ..Default::default()
        };
        assert!(!filter.matches(&purchase));
    }

    #[test]
    fn test_filter_time_range_is_half_open() {
        let m = movement(MovementKind::Purchase, None);
        let filter = MovementFilter {
            from: Some(m.timestamp_utc),
            to: Some(m.timestamp_utc),
            ..Default::default()
        };
        assert!(!filter.matches(&m));

        let filter = MovementFilter {
            from: Some(m.timestamp_utc),
            to: Some(m.timestamp_utc + chrono::Duration::seconds(1)),
            ..Default::default()
        };
        assert!(filter.matches(&m));
    }
}
