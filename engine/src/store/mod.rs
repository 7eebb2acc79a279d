// ============================================================================
// STOCKBOOK - STORAGE PORT
// ============================================================================
// Module: engine/src/store/mod.rs
// Description: Persistence boundary of the engine. Every read is tenant
//              scoped and soft-delete filtered by the adapter; the core
//              never issues an unscoped query.
// ============================================================================

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use stockbook_shared::error::Result;
use stockbook_shared::events::AlertKind;
use stockbook_shared::ids::{
    AlertId, InventoryItemId, ProductId, ReservationId, TenantId, VariantId, WarehouseId,
};
use stockbook_shared::quantity::Quantity;
use stockbook_shared::sku::Sku;

use crate::models::{
    Alert, InventoryItem, MovementFilter, Product, Reservation, StockMovement, Variant, Warehouse,
};

/// Sold and refunded totals accumulated against one original-sale
/// reference, maintained transactionally with the ledger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefundTotals {
    pub sold: Quantity,
    pub refunded: Quantity,
}

impl RefundTotals {
    pub fn remaining(&self) -> Quantity {
        self.sold
            .checked_sub(self.refunded)
            .unwrap_or(Quantity::ZERO)
    }
}

/// Persistence port of the engine.
///
/// Contract notes:
/// - `commit_movement` / `commit_transfer` / the reservation commits are
///   single transactions: the ledger append, the projection update and any
///   index maintenance land together or not at all.
/// - Movements are append-only; no method updates or deletes one.
/// - Adapters apply the tenant predicate and the soft-delete predicate at
///   every query site.
#[async_trait]
pub trait InventoryStore: Send + Sync + 'static {
    // ------------------------------------------------------------------
    // Catalog
    // ------------------------------------------------------------------
    async fn insert_product(&self, product: &Product) -> Result<()>;
    async fn get_product(&self, tenant: TenantId, id: ProductId) -> Result<Option<Product>>;
    /// Like `get_product` but spans soft-deleted rows; restore needs it.
    async fn get_product_any(&self, tenant: TenantId, id: ProductId) -> Result<Option<Product>>;
    async fn update_product(&self, product: &Product) -> Result<()>;

    /// Fails with `DUPLICATE_SKU` when the tenant already holds the SKU,
    /// whether or not the holder is soft-deleted (a restore must not
    /// collide).
    async fn insert_variant(&self, variant: &Variant) -> Result<()>;
    async fn get_variant(&self, tenant: TenantId, id: VariantId) -> Result<Option<Variant>>;
    async fn update_variant(&self, variant: &Variant) -> Result<()>;
    async fn list_variants(&self, tenant: TenantId) -> Result<Vec<Variant>>;
    async fn list_variants_for_product(
        &self,
        tenant: TenantId,
        product: ProductId,
    ) -> Result<Vec<Variant>>;
    async fn find_variant_by_sku(&self, tenant: TenantId, sku: &Sku) -> Result<Option<Variant>>;

    async fn insert_warehouse(&self, warehouse: &Warehouse) -> Result<()>;
    async fn get_warehouse(&self, tenant: TenantId, id: WarehouseId) -> Result<Option<Warehouse>>;

    // ------------------------------------------------------------------
    // Inventory items & movement ledger
    // ------------------------------------------------------------------
    async fn insert_item(&self, item: &InventoryItem) -> Result<()>;
    async fn get_item(
        &self,
        tenant: TenantId,
        variant: VariantId,
        warehouse: WarehouseId,
    ) -> Result<Option<InventoryItem>>;
    async fn update_item(&self, item: &InventoryItem) -> Result<()>;
    async fn list_items(
        &self,
        tenant: TenantId,
        warehouse: Option<WarehouseId>,
    ) -> Result<Vec<InventoryItem>>;

    /// Append one movement and persist the mutated projection atomically.
    /// `create_item` inserts the projection row first (opening balance and
    /// auto-created transfer destinations).
    async fn commit_movement(
        &self,
        item: &InventoryItem,
        movement: &StockMovement,
        create_item: bool,
    ) -> Result<()>;

    /// Both transfer legs in one transaction; either both commit or
    /// neither.
    async fn commit_transfer(
        &self,
        source: &InventoryItem,
        out_leg: &StockMovement,
        destination: &InventoryItem,
        in_leg: &StockMovement,
        create_destination: bool,
    ) -> Result<()>;

    async fn list_movements(
        &self,
        tenant: TenantId,
        item: InventoryItemId,
        filter: &MovementFilter,
    ) -> Result<Vec<StockMovement>>;

    /// Movements across the tenant in `[from, to)`, optionally narrowed to
    /// one warehouse; feeds the dashboard movement rates.
    async fn list_movements_in_range(
        &self,
        tenant: TenantId,
        warehouse: Option<WarehouseId>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StockMovement>>;

    async fn refund_totals(
        &self,
        tenant: TenantId,
        item: InventoryItemId,
        reference: &str,
    ) -> Result<RefundTotals>;

    // ------------------------------------------------------------------
    // Reservations
    // ------------------------------------------------------------------

    /// Insert a reservation and persist the item's adjusted reserved
    /// counter in one transaction.
    async fn commit_new_reservation(
        &self,
        item: &InventoryItem,
        reservation: &Reservation,
    ) -> Result<()>;

    /// Persist a reservation state change together with the item's
    /// adjusted reserved counter.
    async fn commit_reservation_change(
        &self,
        item: &InventoryItem,
        reservation: &Reservation,
    ) -> Result<()>;

    async fn get_reservation(
        &self,
        tenant: TenantId,
        id: ReservationId,
    ) -> Result<Option<Reservation>>;
    async fn list_reservations(
        &self,
        tenant: TenantId,
        variant: VariantId,
        warehouse: WarehouseId,
        include_terminal: bool,
    ) -> Result<Vec<Reservation>>;

    /// Non-terminal reservations with `expires_at_utc <= cutoff`, oldest
    /// expiry first, bounded by `limit`. Spans tenants; only the engine's
    /// own sweeper calls it.
    async fn list_due_reservations(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reservation>>;

    // ------------------------------------------------------------------
    // Alerts
    // ------------------------------------------------------------------
    async fn insert_alert(&self, alert: &Alert) -> Result<()>;
    async fn get_alert(&self, tenant: TenantId, id: AlertId) -> Result<Option<Alert>>;
    async fn update_alert(&self, alert: &Alert) -> Result<()>;
    async fn list_alerts(&self, tenant: TenantId, include_acknowledged: bool) -> Result<Vec<Alert>>;
    async fn find_open_alert(
        &self,
        tenant: TenantId,
        kind: AlertKind,
        variant: Option<VariantId>,
        warehouse: Option<WarehouseId>,
    ) -> Result<Option<Alert>>;

    // ------------------------------------------------------------------
    // Idempotency ledger
    // ------------------------------------------------------------------
    async fn get_completed_outcome(
        &self,
        tenant: TenantId,
        correlation_id: Uuid,
    ) -> Result<Option<serde_json::Value>>;
    async fn record_completed_outcome(
        &self,
        tenant: TenantId,
        correlation_id: Uuid,
        outcome: &serde_json::Value,
    ) -> Result<()>;

    // ------------------------------------------------------------------
    // Background workers
    // ------------------------------------------------------------------
    async fn list_tenant_ids(&self) -> Result<Vec<TenantId>>;
}
