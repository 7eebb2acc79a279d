//! Outbound payload contracts consumed by the dashboard and audit
//! collaborators, plus the wire-facing enums they share with the engine's
//! aggregates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AlertId, ReservationId, TenantId, VariantId, WarehouseId};
use crate::quantity::Quantity;

/// Event type names, mirrored in topic routing.
pub mod inventory_events {
    pub const STOCK_LEVEL_CHANGED: &str = "StockLevelChanged";
    pub const RESERVATION_CREATED: &str = "ReservationCreated";
    pub const RESERVATION_MODIFIED: &str = "ReservationModified";
    pub const RESERVATION_FULFILLED: &str = "ReservationFulfilled";
    pub const RESERVATION_CANCELLED: &str = "ReservationCancelled";
    pub const RESERVATION_EXPIRED: &str = "ReservationExpired";
    pub const ALERT_RAISED: &str = "AlertRaised";
    pub const DASHBOARD_METRICS_UPDATED: &str = "DashboardMetricsUpdated";
}

/// Ledger movement kinds. Inbound kinds carry positive quantities, outbound
/// kinds negative; Adjustment is signed by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "movement_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    OpeningBalance,
    Purchase,
    Sale,
    Refund,
    Adjustment,
    WriteOff,
    TransferOut,
    TransferIn,
}

impl MovementKind {
    pub fn is_inbound(&self) -> bool {
        matches!(
            self,
            MovementKind::OpeningBalance
                | MovementKind::Purchase
                | MovementKind::Refund
                | MovementKind::TransferIn
        )
    }

    pub fn is_outbound(&self) -> bool {
        matches!(
            self,
            MovementKind::Sale | MovementKind::WriteOff | MovementKind::TransferOut
        )
    }
}

/// Reservation lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "reservation_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Active,
    PartiallyFulfilled,
    Fulfilled,
    Cancelled,
    Expired,
}

impl ReservationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Fulfilled
                | ReservationStatus::Cancelled
                | ReservationStatus::Expired
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "alert_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    LowStock,
    OutOfStock,
    Expiring,
    Expired,
    ReservationExpiring,
    UnusualAdjustment,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::LowStock => "low_stock",
            AlertKind::OutOfStock => "out_of_stock",
            AlertKind::Expiring => "expiring",
            AlertKind::Expired => "expired",
            AlertKind::ReservationExpiring => "reservation_expiring",
            AlertKind::UnusualAdjustment => "unusual_adjustment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "alert_severity", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

/// Summary of the movement that caused a stock-level change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementSummary {
    pub kind: MovementKind,
    pub quantity: Quantity,
    pub running_balance: Quantity,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_number: Option<String>,
}

/// Primary event emitted after every successful stock or reservation
/// operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockLevelChanged {
    pub tenant_id: TenantId,
    pub variant_id: VariantId,
    pub warehouse_id: WarehouseId,
    pub total_stock: Quantity,
    pub reserved_stock: Quantity,
    pub available_stock: Quantity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_movement: Option<MovementSummary>,
    pub timestamp: DateTime<Utc>,
}

/// Shared shape of the reservation lifecycle events; `status` tells the
/// transition apart together with the envelope's `event_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationChanged {
    pub tenant_id: TenantId,
    pub reservation_id: ReservationId,
    pub variant_id: VariantId,
    pub warehouse_id: WarehouseId,
    pub current_quantity: Quantity,
    pub fulfilled_quantity: Quantity,
    pub status: ReservationStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRaised {
    pub tenant_id: TenantId,
    pub alert_id: AlertId,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<VariantId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouse_id: Option<WarehouseId>,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Scope of a dashboard metrics payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "scope", content = "warehouse_id")]
pub enum MetricsScope {
    Global,
    ByWarehouse(WarehouseId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "period", content = "bounds")]
pub enum MetricsPeriod {
    Hour,
    Day,
    Week,
    Month,
    Custom(DateTime<Utc>, DateTime<Utc>),
}

impl MetricsPeriod {
    /// Concrete [start, end) bounds of the period relative to `now`.
    pub fn bounds(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        match self {
            MetricsPeriod::Hour => (now - chrono::Duration::hours(1), now),
            MetricsPeriod::Day => (now - chrono::Duration::days(1), now),
            MetricsPeriod::Week => (now - chrono::Duration::weeks(1), now),
            MetricsPeriod::Month => (now - chrono::Duration::days(30), now),
            MetricsPeriod::Custom(start, end) => (*start, *end),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardMetricsUpdated {
    pub tenant_id: TenantId,
    pub scope: MetricsScope,
    pub period: MetricsPeriod,
    pub summary: serde_json::Value,
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movement_kind_signs() {
        assert!(MovementKind::Purchase.is_inbound());
        assert!(MovementKind::TransferIn.is_inbound());
        assert!(MovementKind::Sale.is_outbound());
        assert!(MovementKind::WriteOff.is_outbound());
        assert!(!MovementKind::Adjustment.is_inbound());
        assert!(!MovementKind::Adjustment.is_outbound());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(ReservationStatus::Fulfilled.is_terminal());
        assert!(ReservationStatus::Cancelled.is_terminal());
        assert!(ReservationStatus::Expired.is_terminal());
        assert!(!ReservationStatus::Active.is_terminal());
        assert!(!ReservationStatus::PartiallyFulfilled.is_terminal());
    }

    #[test]
    fn test_custom_period_bounds() {
        let now = Utc::now();
        let start = now - chrono::Duration::days(3);
        let (from, to) = MetricsPeriod::Custom(start, now).bounds(now);
        assert_eq!(from, start);
        assert_eq!(to, now);
    }
}
