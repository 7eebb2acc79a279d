// ============================================================================
// STOCKBOOK - INVENTORY ENGINE
// ============================================================================
// Module: engine/src/engine.rs
// Description: Engine façade. Binds the tenant context, wires the storage
//              port, lock pool, fan-out, read-model cache and background
//              workers, and exposes the command and snapshot-read surface.
// ============================================================================

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use stockbook_shared::config::EngineConfig;
use stockbook_shared::context::TenantContext;
use stockbook_shared::error::{Error, Result};
use stockbook_shared::events::{DomainEvent, GroupKey};
use stockbook_shared::ids::{ActorId, ReservationId, TenantId, VariantId, WarehouseId};
use stockbook_shared::quantity::Quantity;

use crate::bridge::RedisEventBridge;
use crate::idempotency::OperationOutcome;
use crate::locks::LockManager;
use crate::metrics::MetricsCache;
use crate::models::{Alert, InventoryItem, MovementFilter, Reservation, StockMovement};
use crate::notify::Notifier;
use crate::retry::with_retry;
use crate::store::InventoryStore;
use crate::sweeper;

/// Operation counters logged periodically and exposed for monitoring.
#[derive(Debug, Default)]
pub struct EngineCounters {
    pub operations_committed: AtomicU64,
    pub reservations_expired: AtomicU64,
    pub alerts_raised: AtomicU64,
}

pub(crate) struct EngineInner {
    pub(crate) store: Arc<dyn InventoryStore>,
    pub(crate) locks: LockManager,
    pub(crate) notifier: Notifier,
    pub(crate) metrics: MetricsCache,
    pub(crate) config: EngineConfig,
    pub(crate) counters: EngineCounters,
    /// Actor attributed to engine-internal transitions (expiry sweeps).
    pub(crate) system_actor: ActorId,
    pub(crate) sweeper_wake: mpsc::Sender<DateTime<Utc>>,
    sweeper_wake_rx: Mutex<Option<mpsc::Receiver<DateTime<Utc>>>>,
    shutdown_tx: watch::Sender<bool>,
    pub(crate) shutdown_rx: watch::Receiver<bool>,
    worker_handles: Mutex<Vec<JoinHandle<()>>>,
}

/// The core inventory engine. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct InventoryEngine {
    pub(crate) inner: Arc<EngineInner>,
}

/// Lock-free snapshot of one stock position.
#[derive(Debug, Clone, Serialize)]
pub struct StockLevelView {
    pub variant_id: VariantId,
    pub warehouse_id: WarehouseId,
    pub total_stock: Quantity,
    pub reserved_stock: Quantity,
    pub available_stock: Quantity,
    pub allow_negative_stock: bool,
    pub expiry_date: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<&InventoryItem> for StockLevelView {
    fn from(item: &InventoryItem) -> Self {
        Self {
            variant_id: item.variant_id,
            warehouse_id: item.warehouse_id,
            total_stock: item.total_stock,
            reserved_stock: item.reserved_stock,
            available_stock: item.available(),
            allow_negative_stock: item.allow_negative_stock,
            expiry_date: item.expiry_date,
            updated_at: item.updated_at,
        }
    }
}

impl InventoryEngine {
    /// Construct the engine and start its dispatcher. Background workers
    /// (sweeper, metrics refresher, alert detector) start with
    /// [`spawn_workers`](Self::spawn_workers).
    pub async fn start(store: Arc<dyn InventoryStore>, config: EngineConfig) -> Result<Self> {
        let bridge_tx = match config.redis_url {
            Some(ref url) => {
                let bridge = RedisEventBridge::connect(url).await?;
                let (tx, rx) = mpsc::channel(config.event_queue_capacity);
                tokio::spawn(bridge.run(rx));
                Some(tx)
            }
            None => None,
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (notifier, dispatcher_handle) = Notifier::start(&config, bridge_tx, shutdown_rx.clone());
        let metrics = MetricsCache::new(Arc::clone(&store), notifier.clone(), &config);
        let (wake_tx, wake_rx) = mpsc::channel(1);

        let engine = Self {
            inner: Arc::new(EngineInner {
                store,
                locks: LockManager::new(config.lock_pool_capacity),
                notifier,
                metrics,
                config,
                counters: EngineCounters::default(),
                system_actor: ActorId::new(),
                sweeper_wake: wake_tx,
                sweeper_wake_rx: Mutex::new(Some(wake_rx)),
                shutdown_tx,
                shutdown_rx,
                worker_handles: Mutex::new(vec![dispatcher_handle]),
            }),
        };
        info!("inventory engine started");
        Ok(engine)
    }

    /// Start the expiry sweeper, metrics refresher and alert detector.
    pub async fn spawn_workers(&self) -> Result<()> {
        let wake_rx = self
            .inner
            .sweeper_wake_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| Error::Validation("workers already spawned".into()))?;

        let mut handles = self.inner.worker_handles.lock().await;
        handles.push(tokio::spawn(sweeper::run(
            self.clone(),
            wake_rx,
            self.inner.shutdown_rx.clone(),
        )));
        handles.push(tokio::spawn(crate::metrics::run_refresher(
            self.clone(),
            self.inner.shutdown_rx.clone(),
        )));
        handles.push(tokio::spawn(crate::alerts::run_detector(
            self.clone(),
            self.inner.shutdown_rx.clone(),
        )));
        Ok(())
    }

    /// Signal shutdown and wait for the workers to drain.
    pub async fn shutdown(&self) {
        if self.inner.shutdown_tx.send(true).is_err() {
            warn!("shutdown signalled with no live workers");
        }
        let mut handles = self.inner.worker_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        info!(
            operations = self.inner.counters.operations_committed.load(Ordering::Relaxed),
            reservations_expired = self.inner.counters.reservations_expired.load(Ordering::Relaxed),
            alerts = self.inner.counters.alerts_raised.load(Ordering::Relaxed),
            events = self.inner.notifier.published_count(),
            "inventory engine stopped"
        );
    }

    /// Attach to a subscription group.
    pub async fn subscribe(&self, ctx: &TenantContext, group: GroupKey) -> Result<broadcast::Receiver<Arc<DomainEvent>>> {
        ctx.ensure_tenant(group.tenant_id())?;
        Ok(self.inner.notifier.subscribe(group).await)
    }

    pub fn counters(&self) -> &EngineCounters {
        &self.inner.counters
    }

    // ------------------------------------------------------------------
    // Idempotency
    // ------------------------------------------------------------------

    pub(crate) async fn replay(&self, ctx: &TenantContext) -> Result<Option<OperationOutcome>> {
        let Some(correlation_id) = ctx.correlation_id else {
            return Ok(None);
        };
        let stored = with_retry(&self.inner.config.retry, "load completed outcome", || {
            self.inner
                .store
                .get_completed_outcome(ctx.tenant_id, correlation_id)
        })
        .await?;
        Ok(stored.map(serde_json::from_value).transpose()?)
    }

    pub(crate) async fn record_outcome(
        &self,
        ctx: &TenantContext,
        outcome: &OperationOutcome,
    ) -> Result<()> {
        let Some(correlation_id) = ctx.correlation_id else {
            return Ok(());
        };
        let json = serde_json::to_value(outcome)?;
        with_retry(&self.inner.config.retry, "record completed outcome", || {
            self.inner
                .store
                .record_completed_outcome(ctx.tenant_id, correlation_id, &json)
        })
        .await
    }

    // ------------------------------------------------------------------
    // Snapshot reads (lock-free single-instant views)
    // ------------------------------------------------------------------

    pub async fn stock_level(
        &self,
        ctx: &TenantContext,
        variant_id: VariantId,
        warehouse_id: WarehouseId,
    ) -> Result<StockLevelView> {
        let item = self
            .inner
            .store
            .get_item(ctx.tenant_id, variant_id, warehouse_id)
            .await?
            .ok_or(Error::InventoryNotFound)?;
        Ok(StockLevelView::from(&item))
    }

    pub async fn list_stock_levels(
        &self,
        ctx: &TenantContext,
        warehouse_id: Option<WarehouseId>,
    ) -> Result<Vec<StockLevelView>> {
        let items = self.inner.store.list_items(ctx.tenant_id, warehouse_id).await?;
        Ok(items.iter().map(StockLevelView::from).collect())
    }

    pub async fn list_movements(
        &self,
        ctx: &TenantContext,
        variant_id: VariantId,
        warehouse_id: WarehouseId,
        filter: MovementFilter,
    ) -> Result<Vec<StockMovement>> {
        let item = self
            .inner
            .store
            .get_item(ctx.tenant_id, variant_id, warehouse_id)
            .await?
            .ok_or(Error::InventoryNotFound)?;
        self.inner
            .store
            .list_movements(ctx.tenant_id, item.id, &filter)
            .await
    }

    pub async fn get_reservation(
        &self,
        ctx: &TenantContext,
        reservation_id: ReservationId,
    ) -> Result<Reservation> {
        self.inner
            .store
            .get_reservation(ctx.tenant_id, reservation_id)
            .await?
            .ok_or(Error::ReservationNotFound)
    }

    pub async fn list_reservations(
        &self,
        ctx: &TenantContext,
        variant_id: VariantId,
        warehouse_id: WarehouseId,
        include_terminal: bool,
    ) -> Result<Vec<Reservation>> {
        self.inner
            .store
            .list_reservations(ctx.tenant_id, variant_id, warehouse_id, include_terminal)
            .await
    }

    pub async fn list_alerts(
        &self,
        ctx: &TenantContext,
        include_acknowledged: bool,
    ) -> Result<Vec<Alert>> {
        self.inner
            .store
            .list_alerts(ctx.tenant_id, include_acknowledged)
            .await
    }

    // ------------------------------------------------------------------
    // Internal helpers shared by the operation modules
    // ------------------------------------------------------------------

    pub(crate) async fn require_variant(
        &self,
        tenant: TenantId,
        variant_id: VariantId,
    ) -> Result<crate::models::Variant> {
        self.inner
            .store
            .get_variant(tenant, variant_id)
            .await?
            .ok_or(Error::VariantNotFound)
    }

    pub(crate) async fn require_warehouse(
        &self,
        tenant: TenantId,
        warehouse_id: WarehouseId,
    ) -> Result<crate::models::Warehouse> {
        self.inner
            .store
            .get_warehouse(tenant, warehouse_id)
            .await?
            .ok_or(Error::WarehouseNotFound)
    }

    pub(crate) fn bump_operations(&self) {
        self.inner
            .counters
            .operations_committed
            .fetch_add(1, Ordering::Relaxed);
    }
}
