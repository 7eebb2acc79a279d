use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_shared::error::{Error, Result};
use stockbook_shared::ids::{InventoryItemId, TenantId, VariantId, WarehouseId};
use stockbook_shared::quantity::Quantity;

use super::soft_delete::SoftDeleteMarker;

/// Projection of one (tenant, variant, warehouse) stock position. The
/// movement ledger is the source of truth; this aggregate caches the
/// running totals for O(1) reads and owns the invariants enforced on
/// every mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: InventoryItemId,
    pub tenant_id: TenantId,
    pub variant_id: VariantId,
    pub warehouse_id: WarehouseId,
    pub total_stock: Quantity,
    pub reserved_stock: Quantity,
    pub allow_negative_stock: bool,
    pub expiry_date: Option<DateTime<Utc>>,
    /// Number of ledger movements ever appended; doubles as the insertion
    /// sequence for the next movement.
    pub movement_count: u64,
    pub deleted: SoftDeleteMarker,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    /// Factory. `expiry_date`, if supplied, must not precede creation.
    pub fn create(
        tenant_id: TenantId,
        variant_id: VariantId,
        warehouse_id: WarehouseId,
        allow_negative_stock: bool,
        expiry_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if let Some(expiry) = expiry_date {
            if expiry < now {
                return Err(Error::Validation(
                    "expiry date must not precede item creation".into(),
                ));
            }
        }
        Ok(Self {
            id: InventoryItemId::new(),
            tenant_id,
            variant_id,
            warehouse_id,
            total_stock: Quantity::ZERO,
            reserved_stock: Quantity::ZERO,
            allow_negative_stock,
            expiry_date,
            movement_count: 0,
            deleted: SoftDeleteMarker::default(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Auto-created transfer destination: inherits the source's
    /// negative-stock policy and expiry date as-is (the source's expiry
    /// was validated when the source was created).
    pub fn mirror_of(source: &InventoryItem, warehouse_id: WarehouseId, now: DateTime<Utc>) -> Self {
        Self {
            id: InventoryItemId::new(),
            tenant_id: source.tenant_id,
            variant_id: source.variant_id,
            warehouse_id,
            total_stock: Quantity::ZERO,
            reserved_stock: Quantity::ZERO,
            allow_negative_stock: source.allow_negative_stock,
            expiry_date: source.expiry_date,
            movement_count: 0,
            deleted: SoftDeleteMarker::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn available(&self) -> Quantity {
        self.total_stock
            .checked_sub(self.reserved_stock)
            .unwrap_or(Quantity::ZERO)
    }

    /// Apply a signed ledger quantity to the projection, enforcing the
    /// negative-stock policy. Returns the new total.
    pub fn apply_delta(&mut self, delta: Quantity, now: DateTime<Utc>) -> Result<Quantity> {
        let new_total = self.total_stock.checked_add(delta)?;
        if !self.allow_negative_stock && delta.is_negative() {
            if new_total.is_negative() {
                return Err(Error::NegativeStockNotAllowed);
            }
            let new_available = new_total.checked_sub(self.reserved_stock)?;
            if new_available.is_negative() {
                return Err(Error::InsufficientStock {
                    requested: delta.abs(),
                    available: self.available(),
                });
            }
        }
        self.total_stock = new_total;
        self.movement_count += 1;
        self.updated_at = now;
        Ok(new_total)
    }

    /// Grow or shrink the reserved counter; it never drops below zero.
    pub fn adjust_reserved(&mut self, delta: Quantity, now: DateTime<Utc>) -> Result<()> {
        let new_reserved = self.reserved_stock.checked_add(delta)?;
        if new_reserved.is_negative() {
            return Err(Error::Validation(
                "reserved stock cannot become negative".into(),
            ));
        }
        self.reserved_stock = new_reserved;
        self.updated_at = now;
        Ok(())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date.map(|e| e <= now).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(allow_negative: bool) -> InventoryItem {
        InventoryItem::create(
            TenantId::new(),
            VariantId::new(),
            WarehouseId::new(),
            allow_negative,
            None,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_expiry_before_creation_rejected() {
        let now = Utc::now();
        let result = InventoryItem::create(
            TenantId::new(),
            VariantId::new(),
            WarehouseId::new(),
            false,
            Some(now - chrono::Duration::hours(1)),
            now,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_apply_delta_tracks_movement_count() {
        let mut item = item(false);
        item.apply_delta(Quantity::from_units(10), Utc::now()).unwrap();
        item.apply_delta(Quantity::from_units(-4), Utc::now()).unwrap();
        assert_eq!(item.total_stock, Quantity::from_units(6));
        assert_eq!(item.movement_count, 2);
    }

    #[test]
    fn test_negative_stock_policy() {
        let mut strict = item(false);
        strict.apply_delta(Quantity::from_units(5), Utc::now()).unwrap();
        let err = strict
            .apply_delta(Quantity::from_units(-6), Utc::now())
            .unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_STOCK");

        let mut relaxed = item(true);
        relaxed.apply_delta(Quantity::from_units(-3), Utc::now()).unwrap();
        assert_eq!(relaxed.total_stock, Quantity::from_units(-3));
    }

    #[test]
    fn test_reserved_guards_available() {
        let mut item = item(false);
        item.apply_delta(Quantity::from_units(10), Utc::now()).unwrap();
        item.adjust_reserved(Quantity::from_units(8), Utc::now()).unwrap();
        assert_eq!(item.available(), Quantity::from_units(2));

        // Removing 3 would leave available negative even though total stays
        // positive.
        let err = item
            .apply_delta(Quantity::new(dec!(-3)).unwrap(), Utc::now())
            .unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_STOCK");
    }

    #[test]
    fn test_reserved_never_negative() {
        let mut item = item(false);
        assert!(item
            .adjust_reserved(Quantity::from_units(-1), Utc::now())
            .is_err());
    }
}
