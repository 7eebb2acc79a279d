//! In-memory store. Backs the test suite and embedded deployments; the
//! same tenant and soft-delete predicates the Postgres adapter pushes into
//! SQL are applied here as explicit filters on every read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use stockbook_shared::error::{Error, Result};
use stockbook_shared::events::AlertKind;
use stockbook_shared::ids::{
    AlertId, InventoryItemId, ProductId, ReservationId, TenantId, VariantId, WarehouseId,
};
use stockbook_shared::quantity::Quantity;
use stockbook_shared::sku::Sku;

use crate::models::{
    Alert, InventoryItem, MovementFilter, Product, Reservation, StockMovement, Variant, Warehouse,
};

use super::{InventoryStore, RefundTotals};

#[derive(Default)]
struct Inner {
    products: HashMap<ProductId, Product>,
    variants: HashMap<VariantId, Variant>,
    warehouses: HashMap<WarehouseId, Warehouse>,
    items: HashMap<InventoryItemId, InventoryItem>,
    item_index: HashMap<(TenantId, VariantId, WarehouseId), InventoryItemId>,
    /// Ledger per item, in insertion order.
    movements: HashMap<InventoryItemId, Vec<StockMovement>>,
    reservations: HashMap<ReservationId, Reservation>,
    alerts: HashMap<AlertId, Alert>,
    refund_index: HashMap<(InventoryItemId, String), RefundTotals>,
    completed: HashMap<(TenantId, Uuid), serde_json::Value>,
}

impl Inner {
    fn maintain_refund_index(&mut self, movement: &StockMovement) -> Result<()> {
        use stockbook_shared::events::MovementKind;

        let Some(reference) = movement.reference_number.clone() else {
            return Ok(());
        };
        if !matches!(movement.kind, MovementKind::Sale | MovementKind::Refund) {
            return Ok(());
        }
        let entry = self
            .refund_index
            .entry((movement.item_id, reference))
            .or_insert(RefundTotals {
                sold: Quantity::ZERO,
                refunded: Quantity::ZERO,
            });
        match movement.kind {
            MovementKind::Sale => entry.sold = entry.sold.checked_add(movement.quantity.abs())?,
            MovementKind::Refund => {
                entry.refunded = entry.refunded.checked_add(movement.quantity.abs())?
            }
            _ => {}
        }
        Ok(())
    }

    fn append_movement(
        &mut self,
        item: &InventoryItem,
        movement: &StockMovement,
        create_item: bool,
    ) -> Result<()> {
        if create_item {
            self.items.insert(item.id, item.clone());
            self.item_index
                .insert((item.tenant_id, item.variant_id, item.warehouse_id), item.id);
        } else {
            self.items.insert(item.id, item.clone());
        }
        self.maintain_refund_index(movement)?;
        self.movements
            .entry(item.id)
            .or_default()
            .push(movement.clone());
        Ok(())
    }
}

pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InventoryStore for InMemoryStore {
    async fn insert_product(&self, product: &Product) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn get_product(&self, tenant: TenantId, id: ProductId) -> Result<Option<Product>> {
        let inner = self.inner.read().await;
        Ok(inner
            .products
            .get(&id)
            .filter(|p| p.tenant_id == tenant && !p.deleted.is_deleted())
            .cloned())
    }

    async fn get_product_any(&self, tenant: TenantId, id: ProductId) -> Result<Option<Product>> {
        let inner = self.inner.read().await;
        Ok(inner
            .products
            .get(&id)
            .filter(|p| p.tenant_id == tenant)
            .cloned())
    }

    async fn update_product(&self, product: &Product) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.products.contains_key(&product.id) {
            return Err(Error::ProductNotFound);
        }
        inner.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn insert_variant(&self, variant: &Variant) -> Result<()> {
        let mut inner = self.inner.write().await;
        // Uniqueness spans soft-deleted holders so a later restore cannot
        // collide.
        let taken = inner
            .variants
            .values()
            .any(|v| v.tenant_id == variant.tenant_id && v.sku == variant.sku && v.id != variant.id);
        if taken {
            return Err(Error::DuplicateSku(variant.sku.to_string()));
        }
        inner.variants.insert(variant.id, variant.clone());
        Ok(())
    }

    async fn get_variant(&self, tenant: TenantId, id: VariantId) -> Result<Option<Variant>> {
        let inner = self.inner.read().await;
        Ok(inner
            .variants
            .get(&id)
            .filter(|v| v.tenant_id == tenant && !v.deleted.is_deleted())
            .cloned())
    }

    async fn update_variant(&self, variant: &Variant) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.variants.contains_key(&variant.id) {
            return Err(Error::VariantNotFound);
        }
        inner.variants.insert(variant.id, variant.clone());
        Ok(())
    }

    async fn list_variants(&self, tenant: TenantId) -> Result<Vec<Variant>> {
        let inner = self.inner.read().await;
        Ok(inner
            .variants
            .values()
            .filter(|v| v.tenant_id == tenant && !v.deleted.is_deleted())
            .cloned()
            .collect())
    }

    async fn list_variants_for_product(
        &self,
        tenant: TenantId,
        product: ProductId,
    ) -> Result<Vec<Variant>> {
        let inner = self.inner.read().await;
        Ok(inner
            .variants
            .values()
            .filter(|v| v.tenant_id == tenant && v.product_id == product)
            .cloned()
            .collect())
    }

    async fn find_variant_by_sku(&self, tenant: TenantId, sku: &Sku) -> Result<Option<Variant>> {
        let inner = self.inner.read().await;
        Ok(inner
            .variants
            .values()
            .find(|v| v.tenant_id == tenant && &v.sku == sku && !v.deleted.is_deleted())
            .cloned())
    }

    async fn insert_warehouse(&self, warehouse: &Warehouse) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.warehouses.insert(warehouse.id, warehouse.clone());
        Ok(())
    }

    async fn get_warehouse(&self, tenant: TenantId, id: WarehouseId) -> Result<Option<Warehouse>> {
        let inner = self.inner.read().await;
        Ok(inner
            .warehouses
            .get(&id)
            .filter(|w| w.tenant_id == tenant && !w.deleted.is_deleted())
            .cloned())
    }

    async fn insert_item(&self, item: &InventoryItem) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.items.insert(item.id, item.clone());
        inner
            .item_index
            .insert((item.tenant_id, item.variant_id, item.warehouse_id), item.id);
        Ok(())
    }

    async fn get_item(
        &self,
        tenant: TenantId,
        variant: VariantId,
        warehouse: WarehouseId,
    ) -> Result<Option<InventoryItem>> {
        let inner = self.inner.read().await;
        let Some(id) = inner.item_index.get(&(tenant, variant, warehouse)) else {
            return Ok(None);
        };
        Ok(inner
            .items
            .get(id)
            .filter(|i| i.tenant_id == tenant && !i.deleted.is_deleted())
            .cloned())
    }

    async fn update_item(&self, item: &InventoryItem) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.items.contains_key(&item.id) {
            return Err(Error::InventoryNotFound);
        }
        inner.items.insert(item.id, item.clone());
        Ok(())
    }

    async fn list_items(
        &self,
        tenant: TenantId,
        warehouse: Option<WarehouseId>,
    ) -> Result<Vec<InventoryItem>> {
        let inner = self.inner.read().await;
        Ok(inner
            .items
            .values()
            .filter(|i| i.tenant_id == tenant && !i.deleted.is_deleted())
            .filter(|i| warehouse.map(|w| i.warehouse_id == w).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn commit_movement(
        &self,
        item: &InventoryItem,
        movement: &StockMovement,
        create_item: bool,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.append_movement(item, movement, create_item)
    }

    async fn commit_transfer(
        &self,
        source: &InventoryItem,
        out_leg: &StockMovement,
        destination: &InventoryItem,
        in_leg: &StockMovement,
        create_destination: bool,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.append_movement(source, out_leg, false)?;
        inner.append_movement(destination, in_leg, create_destination)?;
        Ok(())
    }

    async fn list_movements(
        &self,
        tenant: TenantId,
        item: InventoryItemId,
        filter: &MovementFilter,
    ) -> Result<Vec<StockMovement>> {
        let inner = self.inner.read().await;
        let mut movements: Vec<StockMovement> = inner
            .movements
            .get(&item)
            .map(|ledger| {
                ledger
                    .iter()
                    .filter(|m| m.tenant_id == tenant && filter.matches(m))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        movements.sort_by_key(|m| m.order_key());
        if let Some(limit) = filter.limit {
            movements.truncate(limit);
        }
        Ok(movements)
    }

    async fn list_movements_in_range(
        &self,
        tenant: TenantId,
        warehouse: Option<WarehouseId>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StockMovement>> {
        let inner = self.inner.read().await;
        let mut movements: Vec<StockMovement> = inner
            .movements
            .values()
            .flatten()
            .filter(|m| m.tenant_id == tenant)
            .filter(|m| warehouse.map(|w| m.warehouse_id == w).unwrap_or(true))
            .filter(|m| m.timestamp_utc >= from && m.timestamp_utc < to)
            .cloned()
            .collect();
        movements.sort_by_key(|m| m.order_key());
        Ok(movements)
    }

    async fn refund_totals(
        &self,
        tenant: TenantId,
        item: InventoryItemId,
        reference: &str,
    ) -> Result<RefundTotals> {
        let inner = self.inner.read().await;
        let owned = inner
            .items
            .get(&item)
            .map(|i| i.tenant_id == tenant)
            .unwrap_or(false);
        if !owned {
            return Err(Error::InventoryNotFound);
        }
        Ok(inner
            .refund_index
            .get(&(item, reference.to_string()))
            .copied()
            .unwrap_or(RefundTotals {
                sold: Quantity::ZERO,
                refunded: Quantity::ZERO,
            }))
    }

    async fn commit_new_reservation(
        &self,
        item: &InventoryItem,
        reservation: &Reservation,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.items.insert(item.id, item.clone());
        inner
            .reservations
            .insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn commit_reservation_change(
        &self,
        item: &InventoryItem,
        reservation: &Reservation,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.reservations.contains_key(&reservation.id) {
            return Err(Error::ReservationNotFound);
        }
        inner.items.insert(item.id, item.clone());
        inner
            .reservations
            .insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn get_reservation(
        &self,
        tenant: TenantId,
        id: ReservationId,
    ) -> Result<Option<Reservation>> {
        let inner = self.inner.read().await;
        Ok(inner
            .reservations
            .get(&id)
            .filter(|r| r.tenant_id == tenant)
            .cloned())
    }

    async fn list_reservations(
        &self,
        tenant: TenantId,
        variant: VariantId,
        warehouse: WarehouseId,
        include_terminal: bool,
    ) -> Result<Vec<Reservation>> {
        let inner = self.inner.read().await;
        let mut reservations: Vec<Reservation> = inner
            .reservations
            .values()
            .filter(|r| {
                r.tenant_id == tenant && r.variant_id == variant && r.warehouse_id == warehouse
            })
            .filter(|r| include_terminal || !r.status.is_terminal())
            .cloned()
            .collect();
        reservations.sort_by_key(|r| r.created_at);
        Ok(reservations)
    }

    async fn list_due_reservations(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reservation>> {
        let inner = self.inner.read().await;
        let mut due: Vec<Reservation> = inner
            .reservations
            .values()
            .filter(|r| !r.status.is_terminal() && r.expires_at_utc <= cutoff)
            .cloned()
            .collect();
        due.sort_by_key(|r| r.expires_at_utc);
        due.truncate(limit);
        Ok(due)
    }

    async fn insert_alert(&self, alert: &Alert) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.alerts.insert(alert.id, alert.clone());
        Ok(())
    }

    async fn get_alert(&self, tenant: TenantId, id: AlertId) -> Result<Option<Alert>> {
        let inner = self.inner.read().await;
        Ok(inner
            .alerts
            .get(&id)
            .filter(|a| a.tenant_id == tenant)
            .cloned())
    }

    async fn update_alert(&self, alert: &Alert) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.alerts.contains_key(&alert.id) {
            return Err(Error::Validation("alert does not exist".into()));
        }
        inner.alerts.insert(alert.id, alert.clone());
        Ok(())
    }

    async fn list_alerts(&self, tenant: TenantId, include_acknowledged: bool) -> Result<Vec<Alert>> {
        let inner = self.inner.read().await;
        let mut alerts: Vec<Alert> = inner
            .alerts
            .values()
            .filter(|a| a.tenant_id == tenant)
            .filter(|a| include_acknowledged || a.is_open())
            .cloned()
            .collect();
        alerts.sort_by_key(|a| a.created_at);
        Ok(alerts)
    }

    async fn find_open_alert(
        &self,
        tenant: TenantId,
        kind: AlertKind,
        variant: Option<VariantId>,
        warehouse: Option<WarehouseId>,
    ) -> Result<Option<Alert>> {
        let inner = self.inner.read().await;
        Ok(inner
            .alerts
            .values()
            .find(|a| {
                a.tenant_id == tenant
                    && a.kind == kind
                    && a.variant_id == variant
                    && a.warehouse_id == warehouse
                    && a.is_open()
            })
            .cloned())
    }

    async fn get_completed_outcome(
        &self,
        tenant: TenantId,
        correlation_id: Uuid,
    ) -> Result<Option<serde_json::Value>> {
        let inner = self.inner.read().await;
        Ok(inner.completed.get(&(tenant, correlation_id)).cloned())
    }

    async fn record_completed_outcome(
        &self,
        tenant: TenantId,
        correlation_id: Uuid,
        outcome: &serde_json::Value,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .completed
            .entry((tenant, correlation_id))
            .or_insert_with(|| outcome.clone());
        Ok(())
    }

    async fn list_tenant_ids(&self) -> Result<Vec<TenantId>> {
        let inner = self.inner.read().await;
        let mut tenants: Vec<TenantId> = inner.items.values().map(|i| i.tenant_id).collect();
        tenants.extend(inner.reservations.values().map(|r| r.tenant_id));
        tenants.sort();
        tenants.dedup();
        Ok(tenants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockbook_shared::events::MovementKind;
    use stockbook_shared::ids::ActorId;
    use stockbook_shared::metadata::MovementMetadata;

    fn item() -> InventoryItem {
        InventoryItem::create(
            TenantId::new(),
            VariantId::new(),
            WarehouseId::new(),
            false,
            None,
            Utc::now(),
        )
        .unwrap()
    }

    fn movement_for(item: &InventoryItem, kind: MovementKind, quantity: i64, reference: Option<&str>) -> StockMovement {
        StockMovement {
            id: stockbook_shared::ids::MovementId::new(),
            tenant_id: item.tenant_id,
            item_id: item.id,
            variant_id: item.variant_id,
            warehouse_id: item.warehouse_id,
            kind,
            quantity: Quantity::from_units(quantity),
            running_balance: Quantity::from_units(quantity),
            actor_id: ActorId::new(),
            timestamp_utc: Utc::now(),
            seq: 0,
            reason: "test".into(),
            reference_number: reference.map(String::from),
            metadata: MovementMetadata::new(),
        }
    }

    #[tokio::test]
    async fn test_tenant_predicate_on_reads() {
        let store = InMemoryStore::new();
        let item = item();
        store.insert_item(&item).await.unwrap();

        let found = store
            .get_item(item.tenant_id, item.variant_id, item.warehouse_id)
            .await
            .unwrap();
        assert!(found.is_some());

        let other_tenant = TenantId::new();
        let hidden = store
            .get_item(other_tenant, item.variant_id, item.warehouse_id)
            .await
            .unwrap();
        assert!(hidden.is_none());
    }

    #[tokio::test]
    async fn test_refund_index_tracks_sales_and_refunds() {
        let store = InMemoryStore::new();
        let item = item();
        store.insert_item(&item).await.unwrap();

        let sale = movement_for(&item, MovementKind::Sale, -30, Some("SO-1"));
        store.commit_movement(&item, &sale, false).await.unwrap();
        let refund = movement_for(&item, MovementKind::Refund, 10, Some("SO-1"));
        store.commit_movement(&item, &refund, false).await.unwrap();

        let totals = store
            .refund_totals(item.tenant_id, item.id, "SO-1")
            .await
            .unwrap();
        assert_eq!(totals.sold, Quantity::from_units(30));
        assert_eq!(totals.refunded, Quantity::from_units(10));
        assert_eq!(totals.remaining(), Quantity::from_units(20));
    }

    #[tokio::test]
    async fn test_duplicate_sku_rejected_even_when_deleted() {
        let store = InMemoryStore::new();
        let tenant = TenantId::new();
        let product = Product::create(tenant, "Widget".into(), Utc::now()).unwrap();
        store.insert_product(&product).await.unwrap();

        let mut first = Variant::create(
            tenant,
            product.id,
            Sku::parse("WIDGET-1").unwrap(),
            "Widget".into(),
            stockbook_shared::units::UnitOfMeasure::Each,
            Utc::now(),
        )
        .unwrap();
        store.insert_variant(&first).await.unwrap();

        first.deleted.mark(ActorId::new(), Utc::now());
        store.update_variant(&first).await.unwrap();

        let second = Variant::create(
            tenant,
            product.id,
            Sku::parse("WIDGET-1").unwrap(),
            "Widget again".into(),
            stockbook_shared::units::UnitOfMeasure::Each,
            Utc::now(),
        )
        .unwrap();
        let err = store.insert_variant(&second).await.unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_SKU");
    }

    #[tokio::test]
    async fn test_idempotency_outcome_is_write_once() {
        let store = InMemoryStore::new();
        let tenant = TenantId::new();
        let correlation = Uuid::new_v4();

        store
            .record_completed_outcome(tenant, correlation, &serde_json::json!({"v": 1}))
            .await
            .unwrap();
        store
            .record_completed_outcome(tenant, correlation, &serde_json::json!({"v": 2}))
            .await
            .unwrap();

        let stored = store
            .get_completed_outcome(tenant, correlation)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored["v"], 1);
    }
}
