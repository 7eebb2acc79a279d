//! Catalog commands the engine owns: the minimum product/variant/warehouse
//! administration needed to enforce SKU uniqueness, thresholds, unit
//! conversions and the soft-delete cascade. Everything else about the
//! catalog is an external collaborator.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::instrument;
use validator::Validate;

use stockbook_shared::context::TenantContext;
use stockbook_shared::error::{Error, Result};
use stockbook_shared::ids::{ProductId, VariantId};
use stockbook_shared::quantity::Quantity;
use stockbook_shared::sku::Sku;
use stockbook_shared::units::{UnitConversion, UnitOfMeasure};

use crate::engine::InventoryEngine;
use crate::models::{Product, Variant, Warehouse};

#[derive(Debug, Clone, Validate)]
pub struct CreateVariantRequest {
    pub product_id: ProductId,
    /// Raw SKU; normalized and validated on creation.
    #[validate(length(min = 1, max = 64))]
    pub sku: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub base_unit: UnitOfMeasure,
}

impl InventoryEngine {
    #[instrument(skip(self, ctx, name), fields(tenant = %ctx.tenant_id))]
    pub async fn create_product(&self, ctx: &TenantContext, name: String) -> Result<Product> {
        let product = Product::create(ctx.tenant_id, name, Utc::now())?;
        self.inner.store.insert_product(&product).await?;
        Ok(product)
    }

    /// Create a variant with an immutable, tenant-unique SKU and base unit.
    #[instrument(skip(self, ctx, request), fields(tenant = %ctx.tenant_id))]
    pub async fn create_variant(
        &self,
        ctx: &TenantContext,
        request: CreateVariantRequest,
    ) -> Result<Variant> {
        request
            .validate()
            .map_err(|e| Error::Validation(e.to_string()))?;
        self.inner
            .store
            .get_product(ctx.tenant_id, request.product_id)
            .await?
            .ok_or(Error::ProductNotFound)?;

        let sku = Sku::parse(&request.sku)?;
        let variant = Variant::create(
            ctx.tenant_id,
            request.product_id,
            sku,
            request.name,
            request.base_unit,
            Utc::now(),
        )?;
        self.inner.store.insert_variant(&variant).await?;
        Ok(variant)
    }

    /// Attach or replace a unit-conversion entry on a variant. Conversions
    /// are display metadata; ledger math stays in the base unit.
    pub async fn add_unit_conversion(
        &self,
        ctx: &TenantContext,
        variant_id: VariantId,
        from: UnitOfMeasure,
        to: UnitOfMeasure,
        factor: Decimal,
    ) -> Result<Variant> {
        let mut variant = self.require_variant(ctx.tenant_id, variant_id).await?;
        if from.category() != variant.base_unit.category() {
            return Err(Error::InvalidUnit(format!(
                "conversion category does not match base unit {}",
                variant.base_unit
            )));
        }
        let conversion = UnitConversion::new(from, to, factor)?;
        variant.conversions.add(conversion);
        variant.updated_at = Utc::now();
        self.inner.store.update_variant(&variant).await?;
        Ok(variant)
    }

    /// Set or clear the per-variant low-stock threshold.
    pub async fn set_low_stock_threshold(
        &self,
        ctx: &TenantContext,
        variant_id: VariantId,
        threshold: Option<Quantity>,
    ) -> Result<Variant> {
        if let Some(threshold) = threshold {
            if threshold.is_negative() {
                return Err(Error::Validation(
                    "low-stock threshold cannot be negative".into(),
                ));
            }
        }
        let mut variant = self.require_variant(ctx.tenant_id, variant_id).await?;
        variant.low_stock_threshold = threshold;
        variant.updated_at = Utc::now();
        self.inner.store.update_variant(&variant).await?;
        Ok(variant)
    }

    /// Set or clear the per-unit cost used for stock valuation.
    pub async fn set_unit_cost(
        &self,
        ctx: &TenantContext,
        variant_id: VariantId,
        unit_cost: Option<Decimal>,
    ) -> Result<Variant> {
        if let Some(cost) = unit_cost {
            if cost < Decimal::ZERO {
                return Err(Error::Validation("unit cost cannot be negative".into()));
            }
        }
        let mut variant = self.require_variant(ctx.tenant_id, variant_id).await?;
        variant.unit_cost = unit_cost;
        variant.updated_at = Utc::now();
        self.inner.store.update_variant(&variant).await?;
        Ok(variant)
    }

    /// Tenant-scoped variant lookup.
    pub async fn variant(&self, ctx: &TenantContext, variant_id: VariantId) -> Result<Variant> {
        self.require_variant(ctx.tenant_id, variant_id).await
    }

    /// Convert a display amount between a variant's units using its
    /// conversion table. Display only: ledger math always stays in the
    /// base unit and never consumes the result.
    pub async fn convert_display_quantity(
        &self,
        ctx: &TenantContext,
        variant_id: VariantId,
        amount: Quantity,
        from: UnitOfMeasure,
        to: UnitOfMeasure,
    ) -> Result<Quantity> {
        let variant = self.require_variant(ctx.tenant_id, variant_id).await?;
        let factor = variant.conversions.factor(from, to)?;
        amount.checked_mul(factor)
    }

    pub async fn register_warehouse(&self, ctx: &TenantContext, name: String) -> Result<Warehouse> {
        let warehouse = Warehouse::create(ctx.tenant_id, name, Utc::now())?;
        self.inner.store.insert_warehouse(&warehouse).await?;
        Ok(warehouse)
    }

    /// Soft-delete a product; the delete cascades to its variants. Ledger
    /// history is untouched.
    #[instrument(skip(self, ctx), fields(tenant = %ctx.tenant_id, product = %product_id))]
    pub async fn delete_product(&self, ctx: &TenantContext, product_id: ProductId) -> Result<()> {
        let mut product = self
            .inner
            .store
            .get_product(ctx.tenant_id, product_id)
            .await?
            .ok_or(Error::ProductNotFound)?;
        let now = Utc::now();
        product.deleted.mark(ctx.actor_id, now);
        product.updated_at = now;
        self.inner.store.update_product(&product).await?;

        for mut variant in self
            .inner
            .store
            .list_variants_for_product(ctx.tenant_id, product_id)
            .await?
        {
            if variant.deleted.is_deleted() {
                continue;
            }
            variant.deleted.mark(ctx.actor_id, now);
            variant.updated_at = now;
            self.inner.store.update_variant(&variant).await?;
        }
        Ok(())
    }

    /// Restore a soft-deleted product and the variants deleted with it.
    /// SKU uniqueness still holds: deleted variants keep their SKU
    /// reserved, so the restore cannot collide.
    #[instrument(skip(self, ctx), fields(tenant = %ctx.tenant_id, product = %product_id))]
    pub async fn restore_product(&self, ctx: &TenantContext, product_id: ProductId) -> Result<()> {
        let mut product = self
            .inner
            .store
            .get_product_any(ctx.tenant_id, product_id)
            .await?
            .ok_or(Error::ProductNotFound)?;
        if !product.deleted.is_deleted() {
            return Ok(());
        }
        let deleted_at = product.deleted.deleted_at;

        let now = Utc::now();
        product.deleted.restore();
        product.updated_at = now;
        self.inner.store.update_product(&product).await?;

        // Only variants that fell with the product come back with it;
        // individually deleted variants stay deleted.
        for mut variant in self
            .inner
            .store
            .list_variants_for_product(ctx.tenant_id, product_id)
            .await?
        {
            if variant.deleted.deleted_at == deleted_at {
                variant.deleted.restore();
                variant.updated_at = now;
                self.inner.store.update_variant(&variant).await?;
            }
        }
        Ok(())
    }
}
