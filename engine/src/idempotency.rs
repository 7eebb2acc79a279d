//! Correlation-id replay. When a caller supplies a `correlation_id` the
//! engine records the completed outcome post-commit; a repeat of the same
//! command for the same tenant returns that outcome without side effects.

use serde::{Deserialize, Serialize};

use stockbook_shared::error::{Error, Result};
use stockbook_shared::events::{ReservationChanged, StockLevelChanged};

/// Every command result the engine can replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OperationOutcome {
    Stock(StockLevelChanged),
    Transfer {
        source: StockLevelChanged,
        destination: StockLevelChanged,
    },
    Reservation(ReservationChanged),
}

impl OperationOutcome {
    pub fn into_stock(self) -> Result<StockLevelChanged> {
        match self {
            OperationOutcome::Stock(changed) => Ok(changed),
            _ => Err(Error::Validation(
                "correlation id was used by a different command kind".into(),
            )),
        }
    }

    pub fn into_transfer(self) -> Result<(StockLevelChanged, StockLevelChanged)> {
        match self {
            OperationOutcome::Transfer {
                source,
                destination,
            } => Ok((source, destination)),
            _ => Err(Error::Validation(
                "correlation id was used by a different command kind".into(),
            )),
        }
    }

    pub fn into_reservation(self) -> Result<ReservationChanged> {
        match self {
            OperationOutcome::Reservation(changed) => Ok(changed),
            _ => Err(Error::Validation(
                "correlation id was used by a different command kind".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stockbook_shared::ids::{TenantId, VariantId, WarehouseId};
    use stockbook_shared::quantity::Quantity;

    fn stock_changed() -> StockLevelChanged {
        StockLevelChanged {
            tenant_id: TenantId::new(),
            variant_id: VariantId::new(),
            warehouse_id: WarehouseId::new(),
            total_stock: Quantity::from_units(10),
            reserved_stock: Quantity::ZERO,
            available_stock: Quantity::from_units(10),
            last_movement: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_outcome_round_trips_through_json() {
        let outcome = OperationOutcome::Stock(stock_changed());
        let json = serde_json::to_value(&outcome).unwrap();
        let back: OperationOutcome = serde_json::from_value(json).unwrap();
        assert!(matches!(back, OperationOutcome::Stock(_)));
    }

    #[test]
    fn test_kind_mismatch_is_rejected() {
        let outcome = OperationOutcome::Stock(stock_changed());
        assert!(outcome.into_reservation().is_err());
    }
}
