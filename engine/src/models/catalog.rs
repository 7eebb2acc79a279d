//! The slice of the catalog the engine needs: products, variants with
//! their immutable SKU and base unit, and the warehouse registry. Full
//! category/pricing/attribute administration lives outside the engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockbook_shared::error::{Error, Result};
use stockbook_shared::ids::{ProductId, TenantId, VariantId, WarehouseId};
use stockbook_shared::quantity::Quantity;
use stockbook_shared::sku::Sku;
use stockbook_shared::units::{ConversionTable, UnitOfMeasure};

use super::soft_delete::SoftDeleteMarker;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub tenant_id: TenantId,
    pub name: String,
    pub deleted: SoftDeleteMarker,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn create(tenant_id: TenantId, name: String, now: DateTime<Utc>) -> Result<Self> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(Error::Validation("product name must not be empty".into()));
        }
        Ok(Self {
            id: ProductId::new(),
            tenant_id,
            name,
            deleted: SoftDeleteMarker::default(),
            created_at: now,
            updated_at: now,
        })
    }
}

/// Sellable unit. The SKU and base unit are fixed at creation; conversion
/// entries and the low-stock threshold are mutable metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub id: VariantId,
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub sku: Sku,
    pub name: String,
    pub base_unit: UnitOfMeasure,
    pub conversions: ConversionTable,
    /// Available-stock level at or below which the variant is low-stock.
    /// Absent means zero, so only out-of-stock is reported.
    pub low_stock_threshold: Option<Quantity>,
    /// Optional per-unit cost used for stock valuation.
    pub unit_cost: Option<Decimal>,
    pub deleted: SoftDeleteMarker,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Variant {
    pub fn create(
        tenant_id: TenantId,
        product_id: ProductId,
        sku: Sku,
        name: String,
        base_unit: UnitOfMeasure,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(Error::Validation("variant name must not be empty".into()));
        }
        Ok(Self {
            id: VariantId::new(),
            tenant_id,
            product_id,
            sku,
            name,
            base_unit,
            conversions: ConversionTable::default(),
            low_stock_threshold: None,
            unit_cost: None,
            deleted: SoftDeleteMarker::default(),
            created_at: now,
            updated_at: now,
        })
    }

    /// The low-stock cutoff used by metrics and alert detection.
    pub fn effective_threshold(&self) -> Quantity {
        self.low_stock_threshold.unwrap_or(Quantity::ZERO)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: WarehouseId,
    pub tenant_id: TenantId,
    pub name: String,
    pub deleted: SoftDeleteMarker,
    pub created_at: DateTime<Utc>,
}

impl Warehouse {
    pub fn create(tenant_id: TenantId, name: String, now: DateTime<Utc>) -> Result<Self> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(Error::Validation("warehouse name must not be empty".into()));
        }
        Ok(Self {
            id: WarehouseId::new(),
            tenant_id,
            name,
            deleted: SoftDeleteMarker::default(),
            created_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_threshold_defaults_to_zero() {
        let variant = Variant::create(
            TenantId::new(),
            ProductId::new(),
            Sku::parse("WIDGET-1").unwrap(),
            "Widget".into(),
            UnitOfMeasure::Each,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(variant.effective_threshold(), Quantity::ZERO);
    }

    #[test]
    fn test_blank_names_rejected() {
        assert!(Product::create(TenantId::new(), "  ".into(), Utc::now()).is_err());
        assert!(Warehouse::create(TenantId::new(), "".into(), Utc::now()).is_err());
    }
}
