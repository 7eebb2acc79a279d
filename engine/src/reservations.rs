// ============================================================================
// STOCKBOOK - RESERVATION MANAGER
// ============================================================================
// Module: engine/src/reservations.rs
// Description: Reservation lifecycle commands. Reservations never touch the
//              ledger; they drive the item's reserved counter under the same
//              per-item lock the stock operations use.
// ============================================================================

use chrono::{DateTime, Utc};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use stockbook_shared::context::TenantContext;
use stockbook_shared::error::{Error, Result};
use stockbook_shared::events::{inventory_events, DomainEvent, GroupKey, ReservationChanged};
use stockbook_shared::ids::{ReservationId, VariantId, WarehouseId};
use stockbook_shared::quantity::Quantity;

use crate::engine::InventoryEngine;
use crate::idempotency::OperationOutcome;
use crate::locks::ItemKey;
use crate::models::{InventoryItem, Reservation};
use crate::notify::Outbound;
use crate::ops::stock_changed_payload;
use crate::retry::with_retry;

#[derive(Debug, Clone, Validate)]
pub struct CreateReservationRequest {
    pub variant_id: VariantId,
    pub warehouse_id: WarehouseId,
    pub quantity: Quantity,
    pub expires_at_utc: DateTime<Utc>,
    #[validate(length(min = 1, max = 100))]
    pub reference_number: String,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

impl InventoryEngine {
    /// Reserve available stock. Fails with `INSUFFICIENT_STOCK` when the
    /// quantity cannot be covered; on success availability shrinks without
    /// any ledger movement.
    #[instrument(skip(self, ctx, request), fields(tenant = %ctx.tenant_id))]
    pub async fn create_reservation(
        &self,
        ctx: &TenantContext,
        request: CreateReservationRequest,
    ) -> Result<ReservationChanged> {
        if let Some(prior) = self.replay(ctx).await? {
            return prior.into_reservation();
        }
        request
            .validate()
            .map_err(|e| Error::Validation(e.to_string()))?;
        self.require_variant(ctx.tenant_id, request.variant_id).await?;
        self.require_warehouse(ctx.tenant_id, request.warehouse_id).await?;

        let key = ItemKey::new(ctx.tenant_id, request.variant_id, request.warehouse_id);
        let guard = self.inner.locks.acquire(key).await;

        let now = Utc::now();
        let mut item = self
            .inner
            .store
            .get_item(ctx.tenant_id, request.variant_id, request.warehouse_id)
            .await?
            .ok_or(Error::InventoryNotFound)?;

        if item.available() < request.quantity {
            return Err(Error::InsufficientStock {
                requested: request.quantity,
                available: item.available(),
            });
        }

        let reservation = Reservation::create(
            ctx.tenant_id,
            request.variant_id,
            request.warehouse_id,
            request.quantity,
            request.expires_at_utc,
            request.reference_number,
            request.notes,
            ctx.actor_id,
            now,
        )?;
        item.adjust_reserved(request.quantity, now)?;

        self.commit_reservation(ctx, &item, &reservation, true).await?;
        self.bump_operations();

        let changed = self.publish_reservation_event(
            ctx,
            &item,
            &reservation,
            inventory_events::RESERVATION_CREATED,
        );
        drop(guard);

        // Short-lived reservations get the sweeper a nudge so they expire
        // promptly instead of waiting out a full tick.
        if reservation.expires_at_utc <= now + chrono::Duration::from_std(self.inner.config.sweep_interval).unwrap_or_else(|_| chrono::Duration::zero()) {
            let _ = self.inner.sweeper_wake.try_send(reservation.expires_at_utc);
        }

        self.inner
            .metrics
            .invalidate(ctx.tenant_id, Some(item.warehouse_id))
            .await;
        self.record_outcome(ctx, &OperationOutcome::Reservation(changed.clone()))
            .await?;
        Ok(changed)
    }

    /// Change a reservation's quantity. Growth requires additional
    /// availability; shrink cannot go below the fulfilled quantity.
    #[instrument(skip(self, ctx), fields(tenant = %ctx.tenant_id, reservation = %reservation_id))]
    pub async fn modify_reservation(
        &self,
        ctx: &TenantContext,
        reservation_id: ReservationId,
        new_quantity: Quantity,
    ) -> Result<ReservationChanged> {
        if let Some(prior) = self.replay(ctx).await? {
            return prior.into_reservation();
        }
        self.with_reservation(ctx, reservation_id, |item, reservation, now| {
            let delta = reservation.modify_quantity(new_quantity, now)?;
            if delta.is_positive() && item.available() < delta {
                return Err(Error::InsufficientStock {
                    requested: delta,
                    available: item.available(),
                });
            }
            item.adjust_reserved(delta, now)?;
            Ok(inventory_events::RESERVATION_MODIFIED)
        })
        .await
    }

    /// Push the expiry further out. The new instant must lie in the future
    /// and beyond the current expiry.
    #[instrument(skip(self, ctx), fields(tenant = %ctx.tenant_id, reservation = %reservation_id))]
    pub async fn extend_reservation(
        &self,
        ctx: &TenantContext,
        reservation_id: ReservationId,
        new_expiry: DateTime<Utc>,
    ) -> Result<ReservationChanged> {
        if let Some(prior) = self.replay(ctx).await? {
            return prior.into_reservation();
        }
        self.with_reservation(ctx, reservation_id, |_item, reservation, now| {
            reservation.extend_expiry(new_expiry, now)?;
            Ok(inventory_events::RESERVATION_MODIFIED)
        })
        .await
    }

    /// Record fulfillment of a slice. Releases the slice from the reserved
    /// counter; the matching Sale movement is the caller's own command.
    #[instrument(skip(self, ctx), fields(tenant = %ctx.tenant_id, reservation = %reservation_id))]
    pub async fn fulfill_reservation(
        &self,
        ctx: &TenantContext,
        reservation_id: ReservationId,
        quantity: Quantity,
    ) -> Result<ReservationChanged> {
        if let Some(prior) = self.replay(ctx).await? {
            return prior.into_reservation();
        }
        self.with_reservation(ctx, reservation_id, |item, reservation, now| {
            let released = reservation.fulfill(quantity, now)?;
            item.adjust_reserved(-released, now)?;
            Ok(inventory_events::RESERVATION_FULFILLED)
        })
        .await
    }

    /// Cancel the remainder of a reservation, releasing it back to
    /// available stock.
    #[instrument(skip(self, ctx), fields(tenant = %ctx.tenant_id, reservation = %reservation_id))]
    pub async fn cancel_reservation(
        &self,
        ctx: &TenantContext,
        reservation_id: ReservationId,
        reason: Option<String>,
    ) -> Result<ReservationChanged> {
        if let Some(prior) = self.replay(ctx).await? {
            return prior.into_reservation();
        }
        self.with_reservation_allowing_due(ctx, reservation_id, true, |item, reservation, now| {
            let released = reservation.cancel(reason.clone(), now)?;
            item.adjust_reserved(-released, now)?;
            Ok(inventory_events::RESERVATION_CANCELLED)
        })
        .await
    }

    /// Expire one overdue reservation. Idempotent under races: whichever
    /// caller observes the non-terminal state performs the transition, any
    /// other sees a terminal state and reports `RESERVATION_EXPIRED`.
    pub(crate) async fn expire_reservation(
        &self,
        ctx: &TenantContext,
        reservation_id: ReservationId,
    ) -> Result<ReservationChanged> {
        self.with_reservation_allowing_due(ctx, reservation_id, true, |item, reservation, now| {
            let released = reservation.expire(now)?;
            item.adjust_reserved(-released, now)?;
            Ok(inventory_events::RESERVATION_EXPIRED)
        })
        .await
    }

    // ------------------------------------------------------------------
    // Shared plumbing
    // ------------------------------------------------------------------

    async fn with_reservation<F>(
        &self,
        ctx: &TenantContext,
        reservation_id: ReservationId,
        mutate: F,
    ) -> Result<ReservationChanged>
    where
        F: FnMut(&mut InventoryItem, &mut Reservation, DateTime<Utc>) -> Result<&'static str>,
    {
        self.with_reservation_allowing_due(ctx, reservation_id, false, mutate)
            .await
    }

    /// Load, lock, mutate and commit one reservation together with its
    /// item. `allow_due` lets cancel/expire proceed on an overdue
    /// reservation; every other command on one fails with
    /// `RESERVATION_EXPIRED`.
    async fn with_reservation_allowing_due<F>(
        &self,
        ctx: &TenantContext,
        reservation_id: ReservationId,
        allow_due: bool,
        mut mutate: F,
    ) -> Result<ReservationChanged>
    where
        F: FnMut(&mut InventoryItem, &mut Reservation, DateTime<Utc>) -> Result<&'static str>,
    {
        // Key discovery happens outside the lock; variant/warehouse of a
        // reservation never change.
        let probe = self
            .inner
            .store
            .get_reservation(ctx.tenant_id, reservation_id)
            .await?
            .ok_or(Error::ReservationNotFound)?;
        let key = ItemKey::new(ctx.tenant_id, probe.variant_id, probe.warehouse_id);
        let guard = self.inner.locks.acquire(key).await;

        let now = Utc::now();
        let mut reservation = self
            .inner
            .store
            .get_reservation(ctx.tenant_id, reservation_id)
            .await?
            .ok_or(Error::ReservationNotFound)?;
        if !allow_due && reservation.is_due(now) {
            return Err(Error::ReservationExpired);
        }
        let mut item = self
            .inner
            .store
            .get_item(ctx.tenant_id, reservation.variant_id, reservation.warehouse_id)
            .await?
            .ok_or(Error::InventoryNotFound)?;

        let event_type = mutate(&mut item, &mut reservation, now)?;
        self.commit_reservation(ctx, &item, &reservation, false).await?;
        self.bump_operations();

        let changed = self.publish_reservation_event(ctx, &item, &reservation, event_type);
        drop(guard);

        self.inner
            .metrics
            .invalidate(ctx.tenant_id, Some(item.warehouse_id))
            .await;
        self.record_outcome(ctx, &OperationOutcome::Reservation(changed.clone()))
            .await?;
        Ok(changed)
    }

    async fn commit_reservation(
        &self,
        ctx: &TenantContext,
        item: &InventoryItem,
        reservation: &Reservation,
        create: bool,
    ) -> Result<()> {
        let commit = || async {
            if create {
                self.inner
                    .store
                    .commit_new_reservation(item, reservation)
                    .await
            } else {
                self.inner
                    .store
                    .commit_reservation_change(item, reservation)
                    .await
            }
        };
        if ctx.correlation_id.is_some() {
            with_retry(&self.inner.config.retry, "commit reservation", commit).await
        } else {
            commit().await
        }
    }

    /// Emit the reservation lifecycle event plus the primary
    /// StockLevelChanged for the affected item.
    fn publish_reservation_event(
        &self,
        ctx: &TenantContext,
        item: &InventoryItem,
        reservation: &Reservation,
        event_type: &'static str,
    ) -> ReservationChanged {
        let changed = ReservationChanged {
            tenant_id: reservation.tenant_id,
            reservation_id: reservation.id,
            variant_id: reservation.variant_id,
            warehouse_id: reservation.warehouse_id,
            current_quantity: reservation.current_quantity,
            fulfilled_quantity: reservation.fulfilled_quantity,
            status: reservation.status,
            timestamp: reservation.updated_at,
        };

        let groups = vec![
            GroupKey::Warehouse(ctx.tenant_id, reservation.warehouse_id),
            GroupKey::Variant(ctx.tenant_id, reservation.variant_id),
        ];
        match DomainEvent::builder(
            event_type,
            reservation.id.as_uuid(),
            "Reservation",
            ctx.tenant_id,
        )
        .actor(ctx.actor_id)
        .correlation_id(ctx.correlation_id.unwrap_or_else(Uuid::new_v4))
        .data(&changed)
        .map(|b| b.build())
        {
            Ok(event) => self
                .inner
                .notifier
                .enqueue(Outbound::new(groups.clone(), event)),
            Err(err) => tracing::error!(error = %err, "failed to serialize reservation event"),
        }

        // Reserved stock moved, so availability changed.
        self.emit_stock_changed(ctx, stock_changed_payload(item, None));

        changed
    }
}
