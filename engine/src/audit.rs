//! Consistency audit. Recomputes a projection from its ledger and open
//! reservations under the item lock and reports any drift: the projected
//! total must equal the movement sum, every running balance must equal its
//! prefix sum, and the reserved counter must equal the outstanding
//! reservation quantity.

use serde::Serialize;
use tracing::warn;

use stockbook_shared::context::TenantContext;
use stockbook_shared::error::{Error, Result};
use stockbook_shared::ids::{VariantId, WarehouseId};
use stockbook_shared::quantity::Quantity;

use crate::engine::InventoryEngine;
use crate::locks::ItemKey;
use crate::models::MovementFilter;

#[derive(Debug, Clone, Serialize)]
pub struct ItemAuditReport {
    pub variant_id: VariantId,
    pub warehouse_id: WarehouseId,
    pub projected_total: Quantity,
    pub ledger_total: Quantity,
    pub projected_reserved: Quantity,
    pub outstanding_reserved: Quantity,
    pub movement_count: u64,
    pub running_balances_consistent: bool,
}

impl ItemAuditReport {
    pub fn is_consistent(&self) -> bool {
        self.projected_total == self.ledger_total
            && self.projected_reserved == self.outstanding_reserved
            && self.running_balances_consistent
    }
}

impl InventoryEngine {
    /// Audit one item. Takes the item lock so the ledger, projection and
    /// reservations are read at a single instant.
    pub async fn audit_item(
        &self,
        ctx: &TenantContext,
        variant_id: VariantId,
        warehouse_id: WarehouseId,
    ) -> Result<ItemAuditReport> {
        let key = ItemKey::new(ctx.tenant_id, variant_id, warehouse_id);
        let _guard = self.inner.locks.acquire(key).await;

        let item = self
            .inner
            .store
            .get_item(ctx.tenant_id, variant_id, warehouse_id)
            .await?
            .ok_or(Error::InventoryNotFound)?;
        let movements = self
            .inner
            .store
            .list_movements(ctx.tenant_id, item.id, &MovementFilter::default())
            .await?;
        let reservations = self
            .inner
            .store
            .list_reservations(ctx.tenant_id, variant_id, warehouse_id, false)
            .await?;

        let mut ledger_total = Quantity::ZERO;
        let mut running_ok = true;
        for movement in &movements {
            ledger_total = ledger_total.checked_add(movement.quantity)?;
            if movement.running_balance != ledger_total {
                running_ok = false;
            }
        }

        let mut outstanding = Quantity::ZERO;
        for reservation in &reservations {
            outstanding = outstanding.checked_add(reservation.outstanding())?;
        }

        let report = ItemAuditReport {
            variant_id,
            warehouse_id,
            projected_total: item.total_stock,
            ledger_total,
            projected_reserved: item.reserved_stock,
            outstanding_reserved: outstanding,
            movement_count: movements.len() as u64,
            running_balances_consistent: running_ok,
        };
        if !report.is_consistent() {
            warn!(
                %variant_id,
                %warehouse_id,
                projected = %report.projected_total,
                ledger = %report.ledger_total,
                "projection drifted from ledger"
            );
        }
        Ok(report)
    }

    /// Audit every item of the tenant, one lock at a time.
    pub async fn audit_tenant(&self, ctx: &TenantContext) -> Result<Vec<ItemAuditReport>> {
        let items = self.inner.store.list_items(ctx.tenant_id, None).await?;
        let mut reports = Vec::with_capacity(items.len());
        for item in items {
            reports.push(
                self.audit_item(ctx, item.variant_id, item.warehouse_id)
                    .await?,
            );
        }
        Ok(reports)
    }
}
