// ============================================================================
// STOCKBOOK - POSTGRES STORE
// ============================================================================
// Module: engine/src/store/postgres.rs
// Description: Postgres adapter for the storage port. One movement plus its
//              projection mutation is one transaction; every query carries
//              the tenant predicate and, where applicable, the soft-delete
//              predicate.
// ============================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, QueryBuilder, Row, Transaction};
use uuid::Uuid;

use stockbook_shared::error::{Error, Result};
use stockbook_shared::events::{AlertKind, AlertSeverity, MovementKind, ReservationStatus};
use stockbook_shared::ids::{
    ActorId, AlertId, InventoryItemId, MovementId, ProductId, ReservationId, TenantId, VariantId,
    WarehouseId,
};
use stockbook_shared::quantity::Quantity;
use stockbook_shared::sku::Sku;
use stockbook_shared::units::{ConversionTable, UnitOfMeasure};

use crate::models::soft_delete::SoftDeleteMarker;
use crate::models::{
    Alert, InventoryItem, MovementFilter, Product, Reservation, StockMovement, Variant, Warehouse,
};

use super::{InventoryStore, RefundTotals};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Infrastructure(format!("migration failed: {e}")))?;
        Ok(())
    }

    fn soft_delete(row: &PgRow) -> Result<SoftDeleteMarker> {
        let deleted_by: Option<Uuid> = row.try_get("deleted_by")?;
        Ok(SoftDeleteMarker {
            deleted_at: row.try_get("deleted_at")?,
            deleted_by: deleted_by.map(ActorId::from_uuid).transpose()?,
        })
    }

    fn quantity(row: &PgRow, column: &str) -> Result<Quantity> {
        Quantity::new(row.try_get::<Decimal, _>(column)?)
    }

    fn row_to_product(row: &PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::from_uuid(row.try_get("id")?)?,
            tenant_id: TenantId::from_uuid(row.try_get("tenant_id")?)?,
            name: row.try_get("name")?,
            deleted: Self::soft_delete(row)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_variant(row: &PgRow) -> Result<Variant> {
        let threshold: Option<Decimal> = row.try_get("low_stock_threshold")?;
        let conversions: serde_json::Value = row.try_get("conversions")?;
        Ok(Variant {
            id: VariantId::from_uuid(row.try_get("id")?)?,
            tenant_id: TenantId::from_uuid(row.try_get("tenant_id")?)?,
            product_id: ProductId::from_uuid(row.try_get("product_id")?)?,
            sku: Sku::parse(row.try_get("sku")?)?,
            name: row.try_get("name")?,
            base_unit: row.try_get::<UnitOfMeasure, _>("base_unit")?,
            conversions: serde_json::from_value::<ConversionTable>(conversions)?,
            low_stock_threshold: threshold.map(Quantity::new).transpose()?,
            unit_cost: row.try_get("unit_cost")?,
            deleted: Self::soft_delete(row)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_warehouse(row: &PgRow) -> Result<Warehouse> {
        Ok(Warehouse {
            id: WarehouseId::from_uuid(row.try_get("id")?)?,
            tenant_id: TenantId::from_uuid(row.try_get("tenant_id")?)?,
            name: row.try_get("name")?,
            deleted: Self::soft_delete(row)?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_item(row: &PgRow) -> Result<InventoryItem> {
        let movement_count: i64 = row.try_get("movement_count")?;
        Ok(InventoryItem {
            id: InventoryItemId::from_uuid(row.try_get("id")?)?,
            tenant_id: TenantId::from_uuid(row.try_get("tenant_id")?)?,
            variant_id: VariantId::from_uuid(row.try_get("variant_id")?)?,
            warehouse_id: WarehouseId::from_uuid(row.try_get("warehouse_id")?)?,
            total_stock: Self::quantity(row, "total_stock")?,
            reserved_stock: Self::quantity(row, "reserved_stock")?,
            allow_negative_stock: row.try_get("allow_negative_stock")?,
            expiry_date: row.try_get("expiry_date")?,
            movement_count: movement_count as u64,
            deleted: Self::soft_delete(row)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_movement(row: &PgRow) -> Result<StockMovement> {
        let seq: i64 = row.try_get("seq")?;
        let metadata: serde_json::Value = row.try_get("metadata")?;
        Ok(StockMovement {
            id: MovementId::from_uuid(row.try_get("id")?)?,
            tenant_id: TenantId::from_uuid(row.try_get("tenant_id")?)?,
            item_id: InventoryItemId::from_uuid(row.try_get("item_id")?)?,
            variant_id: VariantId::from_uuid(row.try_get("variant_id")?)?,
            warehouse_id: WarehouseId::from_uuid(row.try_get("warehouse_id")?)?,
            kind: row.try_get::<MovementKind, _>("kind")?,
            quantity: Self::quantity(row, "quantity")?,
            running_balance: Self::quantity(row, "running_balance")?,
            actor_id: ActorId::from_uuid(row.try_get("actor_id")?)?,
            timestamp_utc: row.try_get("timestamp_utc")?,
            seq: seq as u64,
            reason: row.try_get("reason")?,
            reference_number: row.try_get("reference_number")?,
            metadata: serde_json::from_value(metadata)?,
        })
    }

    fn row_to_reservation(row: &PgRow) -> Result<Reservation> {
        Ok(Reservation {
            id: ReservationId::from_uuid(row.try_get("id")?)?,
            tenant_id: TenantId::from_uuid(row.try_get("tenant_id")?)?,
            variant_id: VariantId::from_uuid(row.try_get("variant_id")?)?,
            warehouse_id: WarehouseId::from_uuid(row.try_get("warehouse_id")?)?,
            original_quantity: Self::quantity(row, "original_quantity")?,
            current_quantity: Self::quantity(row, "current_quantity")?,
            fulfilled_quantity: Self::quantity(row, "fulfilled_quantity")?,
            expires_at_utc: row.try_get("expires_at_utc")?,
            status: row.try_get::<ReservationStatus, _>("status")?,
            reference_number: row.try_get("reference_number")?,
            notes: row.try_get("notes")?,
            created_by: ActorId::from_uuid(row.try_get("created_by")?)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            closed_at: row.try_get("closed_at")?,
        })
    }

    fn row_to_alert(row: &PgRow) -> Result<Alert> {
        let variant_id: Option<Uuid> = row.try_get("variant_id")?;
        let warehouse_id: Option<Uuid> = row.try_get("warehouse_id")?;
        let acknowledged_by: Option<Uuid> = row.try_get("acknowledged_by")?;
        Ok(Alert {
            id: AlertId::from_uuid(row.try_get("id")?)?,
            tenant_id: TenantId::from_uuid(row.try_get("tenant_id")?)?,
            kind: row.try_get::<AlertKind, _>("kind")?,
            severity: row.try_get::<AlertSeverity, _>("severity")?,
            variant_id: variant_id.map(VariantId::from_uuid).transpose()?,
            warehouse_id: warehouse_id.map(WarehouseId::from_uuid).transpose()?,
            message: row.try_get("message")?,
            data: row.try_get("data")?,
            acknowledged_at: row.try_get("acknowledged_at")?,
            acknowledged_by: acknowledged_by.map(ActorId::from_uuid).transpose()?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn upsert_item_tx(
        tx: &mut Transaction<'_, Postgres>,
        item: &InventoryItem,
        create: bool,
    ) -> Result<()> {
        if create {
            sqlx::query(
                "INSERT INTO inventory_items
                 (id, tenant_id, variant_id, warehouse_id, total_stock, reserved_stock,
                  allow_negative_stock, expiry_date, movement_count, deleted_at, deleted_by,
                  created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NULL, NULL, $10, $11)",
            )
            .bind(item.id.as_uuid())
            .bind(item.tenant_id.as_uuid())
            .bind(item.variant_id.as_uuid())
            .bind(item.warehouse_id.as_uuid())
            .bind(item.total_stock.inner())
            .bind(item.reserved_stock.inner())
            .bind(item.allow_negative_stock)
            .bind(item.expiry_date)
            .bind(item.movement_count as i64)
            .bind(item.created_at)
            .bind(item.updated_at)
            .execute(&mut **tx)
            .await?;
        } else {
            sqlx::query(
                "UPDATE inventory_items
                 SET total_stock = $1, reserved_stock = $2, movement_count = $3,
                     expiry_date = $4, allow_negative_stock = $5, updated_at = $6
                 WHERE id = $7 AND tenant_id = $8",
            )
            .bind(item.total_stock.inner())
            .bind(item.reserved_stock.inner())
            .bind(item.movement_count as i64)
            .bind(item.expiry_date)
            .bind(item.allow_negative_stock)
            .bind(item.updated_at)
            .bind(item.id.as_uuid())
            .bind(item.tenant_id.as_uuid())
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn insert_movement_tx(
        tx: &mut Transaction<'_, Postgres>,
        movement: &StockMovement,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO stock_movements
             (id, tenant_id, item_id, variant_id, warehouse_id, kind, quantity,
              running_balance, actor_id, timestamp_utc, seq, reason, reference_number, metadata)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(movement.id.as_uuid())
        .bind(movement.tenant_id.as_uuid())
        .bind(movement.item_id.as_uuid())
        .bind(movement.variant_id.as_uuid())
        .bind(movement.warehouse_id.as_uuid())
        .bind(movement.kind)
        .bind(movement.quantity.inner())
        .bind(movement.running_balance.inner())
        .bind(movement.actor_id.as_uuid())
        .bind(movement.timestamp_utc)
        .bind(movement.seq as i64)
        .bind(&movement.reason)
        .bind(&movement.reference_number)
        .bind(serde_json::to_value(&movement.metadata)?)
        .execute(&mut **tx)
        .await?;

        // Maintain the refunded-sum index for sale/refund movements that
        // carry a reference.
        if let Some(ref reference) = movement.reference_number {
            let (sold_delta, refunded_delta) = match movement.kind {
                MovementKind::Sale => (movement.quantity.abs().inner(), Decimal::ZERO),
                MovementKind::Refund => (Decimal::ZERO, movement.quantity.abs().inner()),
                _ => return Ok(()),
            };
            sqlx::query(
                "INSERT INTO refund_totals (tenant_id, item_id, reference_number, sold, refunded)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (item_id, reference_number)
                 DO UPDATE SET sold = refund_totals.sold + EXCLUDED.sold,
                               refunded = refund_totals.refunded + EXCLUDED.refunded",
            )
            .bind(movement.tenant_id.as_uuid())
            .bind(movement.item_id.as_uuid())
            .bind(reference)
            .bind(sold_delta)
            .bind(refunded_delta)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn upsert_reservation_tx(
        tx: &mut Transaction<'_, Postgres>,
        reservation: &Reservation,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO reservations
             (id, tenant_id, variant_id, warehouse_id, original_quantity, current_quantity,
              fulfilled_quantity, expires_at_utc, status, reference_number, notes, created_by,
              created_at, updated_at, closed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
             ON CONFLICT (id) DO UPDATE SET
                 current_quantity = EXCLUDED.current_quantity,
                 fulfilled_quantity = EXCLUDED.fulfilled_quantity,
                 expires_at_utc = EXCLUDED.expires_at_utc,
                 status = EXCLUDED.status,
                 notes = EXCLUDED.notes,
                 updated_at = EXCLUDED.updated_at,
                 closed_at = EXCLUDED.closed_at",
        )
        .bind(reservation.id.as_uuid())
        .bind(reservation.tenant_id.as_uuid())
        .bind(reservation.variant_id.as_uuid())
        .bind(reservation.warehouse_id.as_uuid())
        .bind(reservation.original_quantity.inner())
        .bind(reservation.current_quantity.inner())
        .bind(reservation.fulfilled_quantity.inner())
        .bind(reservation.expires_at_utc)
        .bind(reservation.status)
        .bind(&reservation.reference_number)
        .bind(&reservation.notes)
        .bind(reservation.created_by.as_uuid())
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .bind(reservation.closed_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for PgStore {
    async fn insert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            "INSERT INTO products (id, tenant_id, name, deleted_at, deleted_by, created_at, updated_at)
             VALUES ($1, $2, $3, NULL, NULL, $4, $5)",
        )
        .bind(product.id.as_uuid())
        .bind(product.tenant_id.as_uuid())
        .bind(&product.name)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_product(&self, tenant: TenantId, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            "SELECT * FROM products WHERE id = $1 AND tenant_id = $2 AND deleted_at IS NULL",
        )
        .bind(id.as_uuid())
        .bind(tenant.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| Self::row_to_product(&r)).transpose()
    }

    async fn get_product_any(&self, tenant: TenantId, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query("SELECT * FROM products WHERE id = $1 AND tenant_id = $2")
            .bind(id.as_uuid())
            .bind(tenant.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::row_to_product(&r)).transpose()
    }

    async fn update_product(&self, product: &Product) -> Result<()> {
        let result = sqlx::query(
            "UPDATE products SET name = $1, deleted_at = $2, deleted_by = $3, updated_at = $4
             WHERE id = $5 AND tenant_id = $6",
        )
        .bind(&product.name)
        .bind(product.deleted.deleted_at)
        .bind(product.deleted.deleted_by.map(|a| a.as_uuid()))
        .bind(product.updated_at)
        .bind(product.id.as_uuid())
        .bind(product.tenant_id.as_uuid())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::ProductNotFound);
        }
        Ok(())
    }

    async fn insert_variant(&self, variant: &Variant) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO variants
             (id, tenant_id, product_id, sku, name, base_unit, conversions,
              low_stock_threshold, unit_cost, deleted_at, deleted_by, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NULL, NULL, $10, $11)
             ON CONFLICT (tenant_id, sku) DO NOTHING",
        )
        .bind(variant.id.as_uuid())
        .bind(variant.tenant_id.as_uuid())
        .bind(variant.product_id.as_uuid())
        .bind(variant.sku.as_str())
        .bind(&variant.name)
        .bind(variant.base_unit)
        .bind(serde_json::to_value(&variant.conversions)?)
        .bind(variant.low_stock_threshold.map(|q| q.inner()))
        .bind(variant.unit_cost)
        .bind(variant.created_at)
        .bind(variant.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::DuplicateSku(variant.sku.to_string()));
        }
        Ok(())
    }

    async fn get_variant(&self, tenant: TenantId, id: VariantId) -> Result<Option<Variant>> {
        let row = sqlx::query(
            "SELECT * FROM variants WHERE id = $1 AND tenant_id = $2 AND deleted_at IS NULL",
        )
        .bind(id.as_uuid())
        .bind(tenant.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| Self::row_to_variant(&r)).transpose()
    }

    async fn update_variant(&self, variant: &Variant) -> Result<()> {
        let result = sqlx::query(
            "UPDATE variants
             SET name = $1, conversions = $2, low_stock_threshold = $3, unit_cost = $4,
                 deleted_at = $5, deleted_by = $6, updated_at = $7
             WHERE id = $8 AND tenant_id = $9",
        )
        .bind(&variant.name)
        .bind(serde_json::to_value(&variant.conversions)?)
        .bind(variant.low_stock_threshold.map(|q| q.inner()))
        .bind(variant.unit_cost)
        .bind(variant.deleted.deleted_at)
        .bind(variant.deleted.deleted_by.map(|a| a.as_uuid()))
        .bind(variant.updated_at)
        .bind(variant.id.as_uuid())
        .bind(variant.tenant_id.as_uuid())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::VariantNotFound);
        }
        Ok(())
    }

    async fn list_variants(&self, tenant: TenantId) -> Result<Vec<Variant>> {
        let rows = sqlx::query(
            "SELECT * FROM variants WHERE tenant_id = $1 AND deleted_at IS NULL ORDER BY sku",
        )
        .bind(tenant.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_variant).collect()
    }

    async fn list_variants_for_product(
        &self,
        tenant: TenantId,
        product: ProductId,
    ) -> Result<Vec<Variant>> {
        let rows = sqlx::query(
            "SELECT * FROM variants WHERE tenant_id = $1 AND product_id = $2 ORDER BY sku",
        )
        .bind(tenant.as_uuid())
        .bind(product.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_variant).collect()
    }

    async fn find_variant_by_sku(&self, tenant: TenantId, sku: &Sku) -> Result<Option<Variant>> {
        let row = sqlx::query(
            "SELECT * FROM variants WHERE tenant_id = $1 AND sku = $2 AND deleted_at IS NULL",
        )
        .bind(tenant.as_uuid())
        .bind(sku.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| Self::row_to_variant(&r)).transpose()
    }

    async fn insert_warehouse(&self, warehouse: &Warehouse) -> Result<()> {
        sqlx::query(
            "INSERT INTO warehouses (id, tenant_id, name, deleted_at, deleted_by, created_at)
             VALUES ($1, $2, $3, NULL, NULL, $4)",
        )
        .bind(warehouse.id.as_uuid())
        .bind(warehouse.tenant_id.as_uuid())
        .bind(&warehouse.name)
        .bind(warehouse.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_warehouse(&self, tenant: TenantId, id: WarehouseId) -> Result<Option<Warehouse>> {
        let row = sqlx::query(
            "SELECT * FROM warehouses WHERE id = $1 AND tenant_id = $2 AND deleted_at IS NULL",
        )
        .bind(id.as_uuid())
        .bind(tenant.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| Self::row_to_warehouse(&r)).transpose()
    }

    async fn insert_item(&self, item: &InventoryItem) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::upsert_item_tx(&mut tx, item, true).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_item(
        &self,
        tenant: TenantId,
        variant: VariantId,
        warehouse: WarehouseId,
    ) -> Result<Option<InventoryItem>> {
        let row = sqlx::query(
            "SELECT * FROM inventory_items
             WHERE tenant_id = $1 AND variant_id = $2 AND warehouse_id = $3
               AND deleted_at IS NULL",
        )
        .bind(tenant.as_uuid())
        .bind(variant.as_uuid())
        .bind(warehouse.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| Self::row_to_item(&r)).transpose()
    }

    async fn update_item(&self, item: &InventoryItem) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::upsert_item_tx(&mut tx, item, false).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_items(
        &self,
        tenant: TenantId,
        warehouse: Option<WarehouseId>,
    ) -> Result<Vec<InventoryItem>> {
        let mut query = QueryBuilder::<Postgres>::new(
            "SELECT * FROM inventory_items WHERE deleted_at IS NULL AND tenant_id = ",
        );
        query.push_bind(tenant.as_uuid());
        if let Some(warehouse) = warehouse {
            query.push(" AND warehouse_id = ");
            query.push_bind(warehouse.as_uuid());
        }
        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_item).collect()
    }

    async fn commit_movement(
        &self,
        item: &InventoryItem,
        movement: &StockMovement,
        create_item: bool,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::upsert_item_tx(&mut tx, item, create_item).await?;
        Self::insert_movement_tx(&mut tx, movement).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn commit_transfer(
        &self,
        source: &InventoryItem,
        out_leg: &StockMovement,
        destination: &InventoryItem,
        in_leg: &StockMovement,
        create_destination: bool,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::upsert_item_tx(&mut tx, source, false).await?;
        Self::insert_movement_tx(&mut tx, out_leg).await?;
        Self::upsert_item_tx(&mut tx, destination, create_destination).await?;
        Self::insert_movement_tx(&mut tx, in_leg).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_movements(
        &self,
        tenant: TenantId,
        item: InventoryItemId,
        filter: &MovementFilter,
    ) -> Result<Vec<StockMovement>> {
        let mut query = QueryBuilder::<Postgres>::new(
            "SELECT * FROM stock_movements WHERE tenant_id = ",
        );
        query.push_bind(tenant.as_uuid());
        query.push(" AND item_id = ");
        query.push_bind(item.as_uuid());
        if let Some(kind) = filter.kind {
            query.push(" AND kind = ");
            query.push_bind(kind);
        }
        if let Some(ref reference) = filter.reference_number {
            query.push(" AND reference_number = ");
            query.push_bind(reference.clone());
        }
        if let Some(from) = filter.from {
            query.push(" AND timestamp_utc >= ");
            query.push_bind(from);
        }
        if let Some(to) = filter.to {
            query.push(" AND timestamp_utc < ");
            query.push_bind(to);
        }
        query.push(" ORDER BY timestamp_utc, seq");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ");
            query.push_bind(limit as i64);
        }
        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_movement).collect()
    }

    async fn list_movements_in_range(
        &self,
        tenant: TenantId,
        warehouse: Option<WarehouseId>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StockMovement>> {
        let mut query = QueryBuilder::<Postgres>::new(
            "SELECT * FROM stock_movements WHERE tenant_id = ",
        );
        query.push_bind(tenant.as_uuid());
        if let Some(warehouse) = warehouse {
            query.push(" AND warehouse_id = ");
            query.push_bind(warehouse.as_uuid());
        }
        query.push(" AND timestamp_utc >= ");
        query.push_bind(from);
        query.push(" AND timestamp_utc < ");
        query.push_bind(to);
        query.push(" ORDER BY timestamp_utc, seq");
        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_movement).collect()
    }

    async fn refund_totals(
        &self,
        tenant: TenantId,
        item: InventoryItemId,
        reference: &str,
    ) -> Result<RefundTotals> {
        let row = sqlx::query(
            "SELECT sold, refunded FROM refund_totals
             WHERE tenant_id = $1 AND item_id = $2 AND reference_number = $3",
        )
        .bind(tenant.as_uuid())
        .bind(item.as_uuid())
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(RefundTotals {
                sold: Self::quantity(&row, "sold")?,
                refunded: Self::quantity(&row, "refunded")?,
            }),
            None => Ok(RefundTotals {
                sold: Quantity::ZERO,
                refunded: Quantity::ZERO,
            }),
        }
    }

    async fn commit_new_reservation(
        &self,
        item: &InventoryItem,
        reservation: &Reservation,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::upsert_item_tx(&mut tx, item, false).await?;
        Self::upsert_reservation_tx(&mut tx, reservation).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn commit_reservation_change(
        &self,
        item: &InventoryItem,
        reservation: &Reservation,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::upsert_item_tx(&mut tx, item, false).await?;
        Self::upsert_reservation_tx(&mut tx, reservation).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_reservation(
        &self,
        tenant: TenantId,
        id: ReservationId,
    ) -> Result<Option<Reservation>> {
        let row = sqlx::query("SELECT * FROM reservations WHERE id = $1 AND tenant_id = $2")
            .bind(id.as_uuid())
            .bind(tenant.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::row_to_reservation(&r)).transpose()
    }

    async fn list_reservations(
        &self,
        tenant: TenantId,
        variant: VariantId,
        warehouse: WarehouseId,
        include_terminal: bool,
    ) -> Result<Vec<Reservation>> {
        let mut query = QueryBuilder::<Postgres>::new(
            "SELECT * FROM reservations WHERE tenant_id = ",
        );
        query.push_bind(tenant.as_uuid());
        query.push(" AND variant_id = ");
        query.push_bind(variant.as_uuid());
        query.push(" AND warehouse_id = ");
        query.push_bind(warehouse.as_uuid());
        if !include_terminal {
            query.push(" AND status IN ('active', 'partially_fulfilled')");
        }
        query.push(" ORDER BY created_at");
        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_reservation).collect()
    }

    async fn list_due_reservations(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(
            "SELECT * FROM reservations
             WHERE status IN ('active', 'partially_fulfilled') AND expires_at_utc <= $1
             ORDER BY expires_at_utc
             LIMIT $2",
        )
        .bind(cutoff)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_reservation).collect()
    }

    async fn insert_alert(&self, alert: &Alert) -> Result<()> {
        sqlx::query(
            "INSERT INTO alerts
             (id, tenant_id, kind, severity, variant_id, warehouse_id, message, data,
              acknowledged_at, acknowledged_by, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(alert.id.as_uuid())
        .bind(alert.tenant_id.as_uuid())
        .bind(alert.kind)
        .bind(alert.severity)
        .bind(alert.variant_id.map(|v| v.as_uuid()))
        .bind(alert.warehouse_id.map(|w| w.as_uuid()))
        .bind(&alert.message)
        .bind(&alert.data)
        .bind(alert.acknowledged_at)
        .bind(alert.acknowledged_by.map(|a| a.as_uuid()))
        .bind(alert.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_alert(&self, tenant: TenantId, id: AlertId) -> Result<Option<Alert>> {
        let row = sqlx::query("SELECT * FROM alerts WHERE id = $1 AND tenant_id = $2")
            .bind(id.as_uuid())
            .bind(tenant.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::row_to_alert(&r)).transpose()
    }

    async fn update_alert(&self, alert: &Alert) -> Result<()> {
        let result = sqlx::query(
            "UPDATE alerts SET acknowledged_at = $1, acknowledged_by = $2
             WHERE id = $3 AND tenant_id = $4",
        )
        .bind(alert.acknowledged_at)
        .bind(alert.acknowledged_by.map(|a| a.as_uuid()))
        .bind(alert.id.as_uuid())
        .bind(alert.tenant_id.as_uuid())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::Validation("alert does not exist".into()));
        }
        Ok(())
    }

    async fn list_alerts(&self, tenant: TenantId, include_acknowledged: bool) -> Result<Vec<Alert>> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM alerts WHERE tenant_id = ");
        query.push_bind(tenant.as_uuid());
        if !include_acknowledged {
            query.push(" AND acknowledged_at IS NULL");
        }
        query.push(" ORDER BY created_at");
        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_alert).collect()
    }

    async fn find_open_alert(
        &self,
        tenant: TenantId,
        kind: AlertKind,
        variant: Option<VariantId>,
        warehouse: Option<WarehouseId>,
    ) -> Result<Option<Alert>> {
        let row = sqlx::query(
            "SELECT * FROM alerts
             WHERE tenant_id = $1 AND kind = $2
               AND variant_id IS NOT DISTINCT FROM $3
               AND warehouse_id IS NOT DISTINCT FROM $4
               AND acknowledged_at IS NULL
             LIMIT 1",
        )
        .bind(tenant.as_uuid())
        .bind(kind)
        .bind(variant.map(|v| v.as_uuid()))
        .bind(warehouse.map(|w| w.as_uuid()))
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| Self::row_to_alert(&r)).transpose()
    }

    async fn get_completed_outcome(
        &self,
        tenant: TenantId,
        correlation_id: Uuid,
    ) -> Result<Option<serde_json::Value>> {
        let row = sqlx::query(
            "SELECT outcome FROM completed_commands WHERE tenant_id = $1 AND correlation_id = $2",
        )
        .bind(tenant.as_uuid())
        .bind(correlation_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row
            .map(|r| r.try_get::<serde_json::Value, _>("outcome"))
            .transpose()?)
    }

    async fn record_completed_outcome(
        &self,
        tenant: TenantId,
        correlation_id: Uuid,
        outcome: &serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO completed_commands (tenant_id, correlation_id, outcome, completed_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (tenant_id, correlation_id) DO NOTHING",
        )
        .bind(tenant.as_uuid())
        .bind(correlation_id)
        .bind(outcome)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_tenant_ids(&self) -> Result<Vec<TenantId>> {
        let rows = sqlx::query(
            "SELECT DISTINCT tenant_id FROM inventory_items
             UNION SELECT DISTINCT tenant_id FROM reservations",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| TenantId::from_uuid(r.try_get("tenant_id")?))
            .collect()
    }
}
