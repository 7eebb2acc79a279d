// ============================================================================
// STOCKBOOK - ALERT DETECTION
// ============================================================================
// Module: engine/src/alerts.rs
// Description: Threshold-crossing alerts raised on the commit path plus a
//              periodic detector for expiry conditions. Open alerts are
//              deduplicated per (kind, variant, warehouse) and cleared by
//              acknowledgement.
// ============================================================================

use chrono::Utc;
use tokio::sync::watch;
use tracing::{info, warn};

use stockbook_shared::context::TenantContext;
use stockbook_shared::error::{Error, Result};
use stockbook_shared::events::{
    inventory_events, AlertKind, AlertRaised, AlertSeverity, DomainEvent, GroupKey,
};
use stockbook_shared::ids::{AlertId, TenantId, VariantId, WarehouseId};
use stockbook_shared::quantity::Quantity;

use crate::engine::InventoryEngine;
use crate::models::{Alert, InventoryItem, Variant};
use crate::notify::Outbound;

impl InventoryEngine {
    /// Raise LowStock/OutOfStock alerts when a commit crosses the
    /// threshold from above. Alerting failures never fail the operation
    /// that triggered them.
    pub(crate) async fn raise_stock_level_alerts(
        &self,
        ctx: &TenantContext,
        variant: &Variant,
        item: &InventoryItem,
        pre_available: Quantity,
    ) {
        let post_available = item.available();
        let threshold = variant.effective_threshold();

        let crossing = if !post_available.is_positive() && pre_available.is_positive() {
            Some((
                AlertKind::OutOfStock,
                AlertSeverity::Critical,
                format!("{} is out of stock", variant.sku),
            ))
        } else if post_available.is_positive()
            && post_available <= threshold
            && pre_available > threshold
        {
            Some((
                AlertKind::LowStock,
                AlertSeverity::Warning,
                format!(
                    "{} is low on stock: {} available, threshold {}",
                    variant.sku, post_available, threshold
                ),
            ))
        } else {
            None
        };

        let Some((kind, severity, message)) = crossing else {
            return;
        };
        let data = serde_json::json!({
            "available": post_available,
            "threshold": threshold,
            "sku": variant.sku.as_str(),
        });
        if let Err(err) = self
            .raise_alert(
                ctx.tenant_id,
                kind,
                severity,
                Some(variant.id),
                Some(item.warehouse_id),
                message,
                data,
            )
            .await
        {
            warn!(error = %err, "failed to raise stock level alert");
        }
    }

    /// An adjustment whose magnitude reaches the configured share of the
    /// pre-existing stock is flagged as unusual.
    pub(crate) async fn raise_unusual_adjustment_alert(
        &self,
        ctx: &TenantContext,
        variant: &Variant,
        warehouse_id: WarehouseId,
        pre_total: Quantity,
        adjustment: Quantity,
    ) {
        if !pre_total.is_positive() {
            return;
        }
        let magnitude = adjustment.abs().inner();
        if magnitude < pre_total.inner() * self.inner.config.unusual_adjustment_ratio {
            return;
        }
        let message = format!(
            "unusual adjustment of {} against prior stock {} for {}",
            adjustment, pre_total, variant.sku
        );
        let data = serde_json::json!({
            "adjustment": adjustment,
            "prior_total": pre_total,
            "sku": variant.sku.as_str(),
        });
        if let Err(err) = self
            .raise_alert(
                ctx.tenant_id,
                AlertKind::UnusualAdjustment,
                AlertSeverity::Warning,
                Some(variant.id),
                Some(warehouse_id),
                message,
                data,
            )
            .await
        {
            warn!(error = %err, "failed to raise unusual adjustment alert");
        }
    }

    /// Insert an alert unless an open one already covers the same
    /// (kind, variant, warehouse), then fan out AlertRaised.
    pub(crate) async fn raise_alert(
        &self,
        tenant: TenantId,
        kind: AlertKind,
        severity: AlertSeverity,
        variant_id: Option<VariantId>,
        warehouse_id: Option<WarehouseId>,
        message: String,
        data: serde_json::Value,
    ) -> Result<()> {
        if self
            .inner
            .store
            .find_open_alert(tenant, kind, variant_id, warehouse_id)
            .await?
            .is_some()
        {
            return Ok(());
        }

        let alert = Alert::new(
            tenant,
            kind,
            severity,
            variant_id,
            warehouse_id,
            message,
            data,
            Utc::now(),
        );
        self.inner.store.insert_alert(&alert).await?;
        self.inner
            .counters
            .alerts_raised
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        let payload = AlertRaised {
            tenant_id: tenant,
            alert_id: alert.id,
            kind,
            severity,
            variant_id,
            warehouse_id,
            data: alert.data.clone(),
            created_at: alert.created_at,
        };
        let event = DomainEvent::builder(
            inventory_events::ALERT_RAISED,
            alert.id.as_uuid(),
            "Alert",
            tenant,
        )
        .data(&payload)?
        .build();
        self.inner.notifier.enqueue(Outbound::new(
            vec![GroupKey::Alerts(tenant, kind)],
            event,
        ));
        Ok(())
    }

    /// Acknowledge an open alert.
    pub async fn acknowledge_alert(&self, ctx: &TenantContext, alert_id: AlertId) -> Result<Alert> {
        let mut alert = self
            .inner
            .store
            .get_alert(ctx.tenant_id, alert_id)
            .await?
            .ok_or_else(|| Error::Validation("alert not found".into()))?;
        if alert.is_open() {
            alert.acknowledge(ctx.actor_id, Utc::now());
            self.inner.store.update_alert(&alert).await?;
        }
        Ok(alert)
    }

    /// One detector pass: expiring/expired stock and reservations nearing
    /// expiry, across all tenants. Returns the number of alerts raised.
    pub async fn detect_expiry_alerts(&self) -> Result<usize> {
        let now = Utc::now();
        let stock_cutoff =
            now + chrono::Duration::from_std(self.inner.config.stock_expiring_lead).unwrap_or_else(|_| chrono::Duration::zero());
        let reservation_cutoff = now
            + chrono::Duration::from_std(self.inner.config.reservation_expiring_lead)
                .unwrap_or_else(|_| chrono::Duration::zero());
        let raised_before = self
            .inner
            .counters
            .alerts_raised
            .load(std::sync::atomic::Ordering::Relaxed);

        for tenant in self.inner.store.list_tenant_ids().await? {
            for item in self.inner.store.list_items(tenant, None).await? {
                let (kind, severity, adjective) = if item.is_expired(now) {
                    (AlertKind::Expired, AlertSeverity::Critical, "expired")
                } else if item.expiry_date.map(|e| e <= stock_cutoff).unwrap_or(false) {
                    (AlertKind::Expiring, AlertSeverity::Warning, "expiring")
                } else {
                    continue;
                };
                let message = format!("stock at warehouse {} is {}", item.warehouse_id, adjective);
                let data = serde_json::json!({
                    "expiry_date": item.expiry_date,
                    "total_stock": item.total_stock,
                });
                self.raise_alert(
                    tenant,
                    kind,
                    severity,
                    Some(item.variant_id),
                    Some(item.warehouse_id),
                    message,
                    data,
                )
                .await?;
            }

            // Reservations close to expiry, surfaced before the sweeper
            // releases them.
            let due_soon = self
                .inner
                .store
                .list_due_reservations(reservation_cutoff, self.inner.config.sweep_batch_limit)
                .await?;
            for reservation in due_soon
                .iter()
                .filter(|r| r.tenant_id == tenant && r.expires_at_utc > now)
            {
                let message = format!(
                    "reservation {} expires at {}",
                    reservation.reference_number, reservation.expires_at_utc
                );
                let data = serde_json::json!({
                    "reservation_id": reservation.id,
                    "expires_at": reservation.expires_at_utc,
                    "outstanding": reservation.outstanding(),
                });
                self.raise_alert(
                    tenant,
                    AlertKind::ReservationExpiring,
                    AlertSeverity::Info,
                    Some(reservation.variant_id),
                    Some(reservation.warehouse_id),
                    message,
                    data,
                )
                .await?;
            }
        }

        let raised_after = self
            .inner
            .counters
            .alerts_raised
            .load(std::sync::atomic::Ordering::Relaxed);
        Ok((raised_after - raised_before) as usize)
    }
}

/// Periodic expiry-alert detector.
pub(crate) async fn run_detector(engine: InventoryEngine, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(engine.inner.config.alert_detector_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!("alert detector started");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match engine.detect_expiry_alerts().await {
                    Ok(raised) if raised > 0 => info!(raised, "expiry alerts raised"),
                    Ok(_) => {}
                    Err(err) => warn!(error = %err, "alert detection pass failed"),
                }
            }
            changed = shutdown.changed() => {
                // A dropped sender means the engine is gone.
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("alert detector stopped");
}
