use thiserror::Error;

use crate::quantity::Quantity;

/// Engine-wide error type. Business failures carry one of the stable error
/// codes surfaced to callers; infrastructure failures wrap their source and
/// are eligible for bounded retry.
#[derive(Error, Debug)]
pub enum Error {
    // ------------------------------------------------------------------
    // Invariant violations (business)
    // ------------------------------------------------------------------
    #[error("opening balance already recorded for this inventory item")]
    OpeningBalanceExists,

    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock {
        requested: Quantity,
        available: Quantity,
    },

    #[error("operation would drive stock negative and the item disallows it")]
    NegativeStockNotAllowed,

    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("refund of {requested} exceeds remaining refundable {remaining} on sale {reference}")]
    RefundExceedsSale {
        reference: String,
        requested: Quantity,
        remaining: Quantity,
    },

    #[error("SKU already in use within tenant: {0}")]
    DuplicateSku(String),

    #[error("invalid unit: {0}")]
    InvalidUnit(String),

    #[error("no conversion registered from {from} to {to}")]
    UnitConversionNotFound { from: String, to: String },

    #[error("reservation has expired")]
    ReservationExpired,

    #[error("reservation is in a terminal state and cannot be modified")]
    ReservationAlreadyUsed,

    #[error("invalid warehouse transfer: {0}")]
    InvalidWarehouseTransfer(String),

    // ------------------------------------------------------------------
    // Not found
    // ------------------------------------------------------------------
    #[error("inventory item not found")]
    InventoryNotFound,

    #[error("reservation not found")]
    ReservationNotFound,

    #[error("variant not found")]
    VariantNotFound,

    #[error("warehouse not found")]
    WarehouseNotFound,

    #[error("product not found")]
    ProductNotFound,

    // ------------------------------------------------------------------
    // Context / authorization
    // ------------------------------------------------------------------
    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    // ------------------------------------------------------------------
    // Validation & infrastructure
    // ------------------------------------------------------------------
    #[error("validation error: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("infrastructure failure: {0}")]
    Infrastructure(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable error code surfaced across the engine boundary.
    pub fn code(&self) -> &'static str {
        match self {
            Error::OpeningBalanceExists => "OPENING_BALANCE_EXISTS",
            Error::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            Error::NegativeStockNotAllowed => "NEGATIVE_STOCK_NOT_ALLOWED",
            Error::InvalidQuantity(_) => "INVALID_QUANTITY",
            Error::RefundExceedsSale { .. } => "REFUND_EXCEEDS_SALE",
            Error::DuplicateSku(_) => "DUPLICATE_SKU",
            Error::InvalidUnit(_) => "INVALID_UNIT",
            Error::UnitConversionNotFound { .. } => "UNIT_CONVERSION_NOT_FOUND",
            Error::ReservationExpired => "RESERVATION_EXPIRED",
            Error::ReservationAlreadyUsed => "RESERVATION_ALREADY_USED",
            Error::InvalidWarehouseTransfer(_) => "INVALID_WAREHOUSE_TRANSFER",
            Error::InventoryNotFound => "INVENTORY_NOT_FOUND",
            Error::ReservationNotFound => "RESERVATION_NOT_FOUND",
            Error::VariantNotFound => "VARIANT_NOT_FOUND",
            Error::WarehouseNotFound => "WAREHOUSE_NOT_FOUND",
            Error::ProductNotFound => "PRODUCT_NOT_FOUND",
            Error::Unauthorized => "UNAUTHORIZED",
            Error::Forbidden => "FORBIDDEN",
            Error::Validation(_) => "VALIDATION_FAILED",
            Error::Database(_) | Error::Redis(_) | Error::Serialization(_) | Error::Infrastructure(_) => {
                "INFRASTRUCTURE_FAILURE"
            }
        }
    }

    /// Only infrastructure failures are retried; business and not-found
    /// failures are reported to the caller as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Database(_) | Error::Redis(_) | Error::Infrastructure(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_codes_are_stable() {
        assert_eq!(Error::OpeningBalanceExists.code(), "OPENING_BALANCE_EXISTS");
        assert_eq!(Error::InventoryNotFound.code(), "INVENTORY_NOT_FOUND");
        assert_eq!(
            Error::DuplicateSku("WIDGET-1".into()).code(),
            "DUPLICATE_SKU"
        );
    }

    #[test]
    fn test_retryability() {
        assert!(Error::Infrastructure("timeout".into()).is_retryable());
        assert!(!Error::InventoryNotFound.is_retryable());
        assert!(!Error::NegativeStockNotAllowed.is_retryable());
    }
}
