// ============================================================================
// STOCKBOOK - DASHBOARD READ MODEL
// ============================================================================
// Module: engine/src/metrics.rs
// Description: Materialized dashboard metrics per (tenant, scope, period)
//              with TTL and staleness marking. Stock and reservation
//              commits invalidate intersecting entries; stale entries are
//              recomputed on the next read or by the background refresher.
// ============================================================================

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use stockbook_shared::config::EngineConfig;
use stockbook_shared::context::TenantContext;
use stockbook_shared::error::Result;
use stockbook_shared::events::{
    inventory_events, DashboardMetricsUpdated, DomainEvent, GroupKey, MetricsPeriod, MetricsScope,
};
use stockbook_shared::ids::{TenantId, WarehouseId};
use stockbook_shared::quantity::Quantity;

use crate::engine::InventoryEngine;
use crate::notify::{Notifier, Outbound};
use crate::store::InventoryStore;

/// Inbound/outbound movement sums over one trailing window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MovementTotals {
    pub inbound: Quantity,
    pub outbound: Quantity,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockMovementRates {
    pub daily: MovementTotals,
    pub weekly: MovementTotals,
    pub monthly: MovementTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseBreakdown {
    pub warehouse_id: WarehouseId,
    pub total_stock: Quantity,
    pub reserved_stock: Quantity,
    pub available_stock: Quantity,
    pub item_count: u64,
}

/// The dashboard payload computed from the live projection and ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardMetrics {
    pub scope: MetricsScope,
    pub period: MetricsPeriod,
    /// Present only when at least one variant carries pricing.
    pub total_stock_value: Option<Decimal>,
    pub total_available_stock: Quantity,
    pub total_reserved_stock: Quantity,
    pub low_stock_variant_count: u64,
    pub out_of_stock_variant_count: u64,
    pub expired_variant_count: u64,
    pub expiring_variant_count: u64,
    pub warehouse_breakdown: Vec<WarehouseBreakdown>,
    pub movement_rates: StockMovementRates,
    pub generated_at: DateTime<Utc>,
}

type MetricsKey = (TenantId, MetricsScope, MetricsPeriod);

struct CacheEntry {
    payload: DashboardMetrics,
    expires_at: DateTime<Utc>,
    is_stale: bool,
}

pub(crate) struct MetricsCache {
    store: Arc<dyn InventoryStore>,
    notifier: Notifier,
    shards: Vec<RwLock<HashMap<MetricsKey, CacheEntry>>>,
    ttl: Duration,
    stock_expiring_lead: Duration,
}

impl MetricsCache {
    pub(crate) fn new(
        store: Arc<dyn InventoryStore>,
        notifier: Notifier,
        config: &EngineConfig,
    ) -> Self {
        let shard_count = config.metrics_cache_shards.max(1);
        Self {
            store,
            notifier,
            shards: (0..shard_count).map(|_| RwLock::new(HashMap::new())).collect(),
            ttl: config.metrics_ttl,
            stock_expiring_lead: config.stock_expiring_lead,
        }
    }

    fn shard_for(&self, key: &MetricsKey) -> &RwLock<HashMap<MetricsKey, CacheEntry>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    /// Fetch from cache, recomputing when missing, stale or past TTL.
    pub(crate) async fn get(
        &self,
        tenant: TenantId,
        scope: MetricsScope,
        period: MetricsPeriod,
    ) -> Result<DashboardMetrics> {
        let key = (tenant, scope, period);
        let now = Utc::now();
        {
            let shard = self.shard_for(&key).read().await;
            if let Some(entry) = shard.get(&key) {
                if !entry.is_stale && entry.expires_at > now {
                    return Ok(entry.payload.clone());
                }
            }
        }
        self.recompute(tenant, scope, period).await
    }

    /// Compute fresh metrics, cache them and emit the coalesced dashboard
    /// update.
    pub(crate) async fn recompute(
        &self,
        tenant: TenantId,
        scope: MetricsScope,
        period: MetricsPeriod,
    ) -> Result<DashboardMetrics> {
        let now = Utc::now();
        let payload = self.compute(tenant, scope, period, now).await?;

        let key = (tenant, scope, period);
        {
            let mut shard = self.shard_for(&key).write().await;
            shard.insert(
                key,
                CacheEntry {
                    payload: payload.clone(),
                    expires_at: now + chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::zero()),
                    is_stale: false,
                },
            );
        }
        self.emit_updated(tenant, scope, &payload);
        Ok(payload)
    }

    /// Mark intersecting entries stale. `warehouse = None` invalidates the
    /// whole tenant.
    pub(crate) async fn invalidate(&self, tenant: TenantId, warehouse: Option<WarehouseId>) {
        for shard in &self.shards {
            let mut shard = shard.write().await;
            for (key, entry) in shard.iter_mut() {
                if key.0 != tenant {
                    continue;
                }
                let intersects = match (key.1, warehouse) {
                    (MetricsScope::Global, _) => true,
                    (MetricsScope::ByWarehouse(_), None) => true,
                    (MetricsScope::ByWarehouse(w), Some(changed)) => w == changed,
                };
                if intersects {
                    entry.is_stale = true;
                }
            }
        }
    }

    /// Keys of entries the background refresher should recompute: stale or
    /// expiring soon, restricted to the rolling hour/day periods.
    async fn refreshable_keys(&self, now: DateTime<Utc>) -> Vec<MetricsKey> {
        let horizon = now + chrono::Duration::seconds(5);
        let mut keys = Vec::new();
        for shard in &self.shards {
            let shard = shard.read().await;
            for (key, entry) in shard.iter() {
                let periodic = matches!(key.2, MetricsPeriod::Hour | MetricsPeriod::Day);
                if periodic && (entry.is_stale || entry.expires_at <= horizon) {
                    keys.push(*key);
                }
            }
        }
        keys
    }

    fn emit_updated(&self, tenant: TenantId, scope: MetricsScope, payload: &DashboardMetrics) {
        let update = DashboardMetricsUpdated {
            tenant_id: tenant,
            scope,
            period: payload.period,
            summary: match serde_json::to_value(payload) {
                Ok(summary) => summary,
                Err(err) => {
                    warn!(error = %err, "failed to serialize dashboard metrics");
                    return;
                }
            },
            generated_at: payload.generated_at,
        };
        let event = DomainEvent::builder(
            inventory_events::DASHBOARD_METRICS_UPDATED,
            Uuid::new_v4(),
            "Dashboard",
            tenant,
        )
        .data(&update)
        .map(|b| b.build());
        match event {
            Ok(event) => self.notifier.enqueue(Outbound::coalesced(
                vec![GroupKey::Dashboard(tenant)],
                event,
                (tenant, scope),
            )),
            Err(err) => warn!(error = %err, "failed to build dashboard event"),
        }
    }

    async fn compute(
        &self,
        tenant: TenantId,
        scope: MetricsScope,
        period: MetricsPeriod,
        now: DateTime<Utc>,
    ) -> Result<DashboardMetrics> {
        let warehouse = match scope {
            MetricsScope::Global => None,
            MetricsScope::ByWarehouse(w) => Some(w),
        };
        let items = self.store.list_items(tenant, warehouse).await?;
        let variants: HashMap<_, _> = self
            .store
            .list_variants(tenant)
            .await?
            .into_iter()
            .map(|v| (v.id, v))
            .collect();

        let mut total_available = Quantity::ZERO;
        let mut total_reserved = Quantity::ZERO;
        let mut total_value: Option<Decimal> = None;
        let mut low_stock = 0u64;
        let mut out_of_stock = 0u64;
        let mut expired = 0u64;
        let mut expiring = 0u64;
        let mut breakdown: HashMap<WarehouseId, WarehouseBreakdown> = HashMap::new();
        let expiring_cutoff =
            now + chrono::Duration::from_std(self.stock_expiring_lead).unwrap_or_else(|_| chrono::Duration::zero());

        for item in &items {
            let available = item.available();
            total_available = total_available.checked_add(available)?;
            total_reserved = total_reserved.checked_add(item.reserved_stock)?;

            let threshold = variants
                .get(&item.variant_id)
                .map(|v| v.effective_threshold())
                .unwrap_or(Quantity::ZERO);
            if !available.is_positive() {
                out_of_stock += 1;
            } else if available <= threshold {
                low_stock += 1;
            }

            if item.is_expired(now) {
                expired += 1;
            } else if item.expiry_date.map(|e| e <= expiring_cutoff).unwrap_or(false) {
                expiring += 1;
            }

            if let Some(cost) = variants.get(&item.variant_id).and_then(|v| v.unit_cost) {
                let value = item.total_stock.inner() * cost;
                total_value = Some(total_value.unwrap_or(Decimal::ZERO) + value);
            }

            let entry = breakdown
                .entry(item.warehouse_id)
                .or_insert(WarehouseBreakdown {
                    warehouse_id: item.warehouse_id,
                    total_stock: Quantity::ZERO,
                    reserved_stock: Quantity::ZERO,
                    available_stock: Quantity::ZERO,
                    item_count: 0,
                });
            entry.total_stock = entry.total_stock.checked_add(item.total_stock)?;
            entry.reserved_stock = entry.reserved_stock.checked_add(item.reserved_stock)?;
            entry.available_stock = entry.available_stock.checked_add(available)?;
            entry.item_count += 1;
        }

        // One month of ledger covers all three trailing windows.
        let monthly_from = now - chrono::Duration::days(30);
        let movements = self
            .store
            .list_movements_in_range(tenant, warehouse, monthly_from, now)
            .await?;
        let mut rates = StockMovementRates::default();
        let daily_from = now - chrono::Duration::days(1);
        let weekly_from = now - chrono::Duration::weeks(1);
        for movement in &movements {
            let amount = movement.quantity.abs();
            let windows: [(&mut MovementTotals, DateTime<Utc>); 3] = [
                (&mut rates.daily, daily_from),
                (&mut rates.weekly, weekly_from),
                (&mut rates.monthly, monthly_from),
            ];
            for (totals, from) in windows {
                if movement.timestamp_utc < from {
                    continue;
                }
                if movement.quantity.is_positive() {
                    totals.inbound = totals.inbound.checked_add(amount)?;
                } else if movement.quantity.is_negative() {
                    totals.outbound = totals.outbound.checked_add(amount)?;
                }
            }
        }

        let mut warehouse_breakdown: Vec<WarehouseBreakdown> = breakdown.into_values().collect();
        warehouse_breakdown.sort_by_key(|b| b.warehouse_id);

        Ok(DashboardMetrics {
            scope,
            period,
            total_stock_value: total_value,
            total_available_stock: total_available,
            total_reserved_stock: total_reserved,
            low_stock_variant_count: low_stock,
            out_of_stock_variant_count: out_of_stock,
            expired_variant_count: expired,
            expiring_variant_count: expiring,
            warehouse_breakdown,
            movement_rates: rates,
            generated_at: now,
        })
    }
}

/// Background refresher: pre-computes the rolling hour/day entries that
/// commits have marked stale, so dashboards rarely pay the recompute on
/// read.
pub(crate) async fn run_refresher(engine: InventoryEngine, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(engine.inner.config.metrics_refresh_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!("metrics refresher started");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let keys = engine.inner.metrics.refreshable_keys(Utc::now()).await;
                for (tenant, scope, period) in keys {
                    if *shutdown.borrow() {
                        break;
                    }
                    if let Err(err) = engine.inner.metrics.recompute(tenant, scope, period).await {
                        warn!(%tenant, error = %err, "metrics refresh failed");
                    }
                }
                debug!("metrics refresh pass complete");
                info!(
                    operations = engine
                        .counters()
                        .operations_committed
                        .load(std::sync::atomic::Ordering::Relaxed),
                    events_published = engine.inner.notifier.published_count(),
                    events_dropped = engine.inner.notifier.dropped_count(),
                    "engine counters"
                );
            }
            changed = shutdown.changed() => {
                // A dropped sender means the engine is gone.
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("metrics refresher stopped");
}

impl InventoryEngine {
    /// Dashboard metrics for a (scope, period), served from the read-model
    /// cache. Stale or expired entries are recomputed on the way out.
    pub async fn dashboard_metrics(
        &self,
        ctx: &TenantContext,
        scope: MetricsScope,
        period: MetricsPeriod,
    ) -> Result<DashboardMetrics> {
        if let MetricsScope::ByWarehouse(warehouse_id) = scope {
            self.require_warehouse(ctx.tenant_id, warehouse_id).await?;
        }
        self.inner.metrics.get(ctx.tenant_id, scope, period).await
    }
}
