// ============================================================================
// STOCKBOOK - INVENTORY ENGINE CRATE
// ============================================================================
// Module: engine/src/lib.rs
// Description: Transactional core of the inventory system: movement ledger,
//              stock projection, reservations with expiry, dashboard read
//              model and real-time fan-out.
// ============================================================================

pub mod alerts;
pub mod audit;
pub mod bridge;
pub mod catalog;
pub mod engine;
pub mod idempotency;
pub mod locks;
pub mod metrics;
pub mod models;
pub mod notify;
pub mod ops;
pub mod reservations;
pub mod retry;
pub mod store;
pub mod sweeper;

pub use audit::ItemAuditReport;
pub use catalog::CreateVariantRequest;
pub use engine::{EngineCounters, InventoryEngine, StockLevelView};
pub use idempotency::OperationOutcome;
pub use metrics::{DashboardMetrics, MovementTotals, StockMovementRates, WarehouseBreakdown};
pub use ops::{
    OpeningBalanceRequest, RefundRequest, StockRequest, TransferOutcome, TransferRequest,
};
pub use reservations::CreateReservationRequest;
pub use store::{InMemoryStore, InventoryStore, PgStore};
