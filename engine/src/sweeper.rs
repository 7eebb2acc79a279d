// ============================================================================
// STOCKBOOK - EXPIRY SWEEPER
// ============================================================================
// Module: engine/src/sweeper.rs
// Description: Periodic worker that expires overdue reservations and
//              releases their reserved stock. Runs on a fixed interval and
//              accepts coalesced wake-up nudges for short-lived
//              reservations; per tick it processes a bounded batch.
// ============================================================================

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use stockbook_shared::context::TenantContext;
use stockbook_shared::error::Result;

use crate::engine::InventoryEngine;

/// Worker loop. Exits when `shutdown` flips to true.
pub(crate) async fn run(
    engine: InventoryEngine,
    mut wake_rx: mpsc::Receiver<DateTime<Utc>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let interval = engine.inner.config.sweep_interval;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // Earliest nudged deadline not yet served.
    let mut pending_wake: Option<Instant> = None;

    info!(interval_secs = interval.as_secs(), "expiry sweeper started");
    loop {
        let wake_sleep = async {
            match pending_wake {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = ticker.tick() => {
                pending_wake = None;
                if let Err(err) = engine.sweep_expired_reservations(Utc::now(), Some(&shutdown)).await {
                    warn!(error = %err, "sweep tick failed");
                }
            }
            nudge = wake_rx.recv() => {
                match nudge {
                    Some(before) => {
                        let delay = (before - Utc::now())
                            .to_std()
                            .unwrap_or_default();
                        let deadline = Instant::now() + delay;
                        // Coalesce: keep only the earliest requested wake.
                        pending_wake = Some(match pending_wake {
                            Some(existing) if existing <= deadline => existing,
                            _ => deadline,
                        });
                    }
                    None => break,
                }
            }
            _ = wake_sleep => {
                pending_wake = None;
                if let Err(err) = engine.sweep_expired_reservations(Utc::now(), Some(&shutdown)).await {
                    warn!(error = %err, "nudged sweep failed");
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
    info!("expiry sweeper stopped");
}

impl InventoryEngine {
    /// Expire every overdue reservation up to the configured batch bound.
    /// Idempotent: a reservation that a concurrent sweep already closed is
    /// skipped, not an error. Returns the number expired.
    pub async fn sweep_expired_reservations(
        &self,
        now: DateTime<Utc>,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<usize> {
        let batch = self
            .inner
            .store
            .list_due_reservations(now, self.inner.config.sweep_batch_limit)
            .await?;
        if batch.is_empty() {
            return Ok(0);
        }

        let mut expired = 0usize;
        for reservation in batch {
            if shutdown.map(|rx| *rx.borrow()).unwrap_or(false) {
                debug!("sweep interrupted by shutdown");
                break;
            }
            let ctx = TenantContext::new(reservation.tenant_id, self.inner.system_actor);
            match self.expire_reservation(&ctx, reservation.id).await {
                Ok(_) => {
                    expired += 1;
                    self.inner
                        .counters
                        .reservations_expired
                        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                }
                // Lost the race to another sweeper or a user command; the
                // reservation reached a terminal state either way.
                Err(err) if !err.is_retryable() => {
                    debug!(reservation = %reservation.id, code = err.code(), "skipped during sweep");
                }
                Err(err) => {
                    warn!(reservation = %reservation.id, error = %err, "sweep item failed");
                }
            }
            // Bounded work per item; yield between items so the sweeper
            // never starves the command path.
            tokio::task::yield_now().await;
        }

        if expired > 0 {
            info!(expired, "expired overdue reservations");
        }
        Ok(expired)
    }
}
