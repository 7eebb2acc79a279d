// ============================================================================
// STOCKBOOK - STOCK OPERATIONS
// ============================================================================
// Module: engine/src/ops.rs
// Description: The stock-mutating command surface: opening balance,
//              purchase, sale, refund, adjustment, write-off and transfer.
//              Every operation serializes on the item lock, appends to the
//              ledger and mutates the projection in one transaction, then
//              queues events for the dispatcher.
// ============================================================================

use chrono::{DateTime, Utc};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use stockbook_shared::context::TenantContext;
use stockbook_shared::error::{Error, Result};
use stockbook_shared::events::{
    inventory_events, DomainEvent, GroupKey, MovementKind, MovementSummary, StockLevelChanged,
};
use stockbook_shared::ids::{MovementId, VariantId, WarehouseId};
use stockbook_shared::metadata::MovementMetadata;
use stockbook_shared::quantity::Quantity;

use crate::engine::InventoryEngine;
use crate::idempotency::OperationOutcome;
use crate::locks::ItemKey;
use crate::models::{InventoryItem, StockMovement, Variant};
use crate::notify::Outbound;
use crate::retry::with_retry;

/// Common inputs of the single-item stock operations.
#[derive(Debug, Clone, Validate)]
pub struct StockRequest {
    pub variant_id: VariantId,
    pub warehouse_id: WarehouseId,
    pub quantity: Quantity,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
    #[validate(length(min = 1, max = 100))]
    pub reference_number: Option<String>,
    pub metadata: Option<MovementMetadata>,
}

impl StockRequest {
    pub fn new(
        variant_id: VariantId,
        warehouse_id: WarehouseId,
        quantity: Quantity,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            variant_id,
            warehouse_id,
            quantity,
            reason: reason.into(),
            reference_number: None,
            metadata: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference_number = Some(reference.into());
        self
    }

    pub fn with_metadata(mut self, metadata: MovementMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[derive(Debug, Clone, Validate)]
pub struct OpeningBalanceRequest {
    pub variant_id: VariantId,
    pub warehouse_id: WarehouseId,
    /// Zero is a valid opening balance and still locks further openings.
    pub quantity: Quantity,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
    #[validate(length(min = 1, max = 100))]
    pub reference_number: Option<String>,
    pub metadata: Option<MovementMetadata>,
    pub allow_negative_stock: bool,
    pub expiry_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Validate)]
pub struct RefundRequest {
    pub variant_id: VariantId,
    pub warehouse_id: WarehouseId,
    pub quantity: Quantity,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
    /// Reference of the sale being refunded; the refund movement carries it.
    #[validate(length(min = 1, max = 100))]
    pub original_sale_reference: String,
    pub metadata: Option<MovementMetadata>,
}

#[derive(Debug, Clone, Validate)]
pub struct TransferRequest {
    pub variant_id: VariantId,
    pub source_warehouse_id: WarehouseId,
    pub destination_warehouse_id: WarehouseId,
    pub quantity: Quantity,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
    /// Shared by both legs; generated when absent.
    #[validate(length(min = 1, max = 100))]
    pub reference_number: Option<String>,
}

/// Outcome of a transfer: the post-state of both legs.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub source: StockLevelChanged,
    pub destination: StockLevelChanged,
}

struct MovementDraft {
    kind: MovementKind,
    /// Signed ledger delta.
    delta: Quantity,
    reason: String,
    reference_number: Option<String>,
    metadata: MovementMetadata,
    timestamp: DateTime<Utc>,
}

impl InventoryEngine {
    // ------------------------------------------------------------------
    // Public commands
    // ------------------------------------------------------------------

    /// Record the opening balance of a (variant, warehouse). The only
    /// movement allowed while the ledger is empty; a second opening fails
    /// with `OPENING_BALANCE_EXISTS`. Creates the inventory item.
    #[instrument(skip(self, ctx, request), fields(tenant = %ctx.tenant_id))]
    pub async fn opening_balance(
        &self,
        ctx: &TenantContext,
        request: OpeningBalanceRequest,
    ) -> Result<StockLevelChanged> {
        if let Some(prior) = self.replay(ctx).await? {
            return prior.into_stock();
        }
        request
            .validate()
            .map_err(|e| Error::Validation(e.to_string()))?;
        if request.quantity.is_negative() {
            return Err(Error::InvalidQuantity(
                "opening balance must not be negative".into(),
            ));
        }
        let variant = self.require_variant(ctx.tenant_id, request.variant_id).await?;
        self.require_warehouse(ctx.tenant_id, request.warehouse_id).await?;

        let key = ItemKey::new(ctx.tenant_id, request.variant_id, request.warehouse_id);
        let guard = self.inner.locks.acquire(key).await;

        let now = Utc::now();
        let existing = self
            .inner
            .store
            .get_item(ctx.tenant_id, request.variant_id, request.warehouse_id)
            .await?;
        let (mut item, create) = match existing {
            Some(item) if item.movement_count > 0 => return Err(Error::OpeningBalanceExists),
            Some(item) => (item, false),
            None => (
                InventoryItem::create(
                    ctx.tenant_id,
                    request.variant_id,
                    request.warehouse_id,
                    request.allow_negative_stock,
                    request.expiry_date,
                    now,
                )?,
                true,
            ),
        };

        let pre_available = item.available();
        let draft = MovementDraft {
            kind: MovementKind::OpeningBalance,
            delta: request.quantity,
            reason: request.reason,
            reference_number: request.reference_number,
            metadata: request.metadata.unwrap_or_default(),
            timestamp: now,
        };
        let changed = self
            .commit_and_publish(ctx, &mut item, draft, create, &variant, pre_available)
            .await?;
        drop(guard);

        self.record_outcome(ctx, &OperationOutcome::Stock(changed.clone()))
            .await?;
        Ok(changed)
    }

    /// Receive purchased stock.
    #[instrument(skip(self, ctx, request), fields(tenant = %ctx.tenant_id))]
    pub async fn purchase(
        &self,
        ctx: &TenantContext,
        request: StockRequest,
    ) -> Result<StockLevelChanged> {
        self.inbound_op(ctx, request, MovementKind::Purchase).await
    }

    /// Record a sale. Fails with `INSUFFICIENT_STOCK` when the item
    /// disallows negative stock and available stock cannot cover it.
    #[instrument(skip(self, ctx, request), fields(tenant = %ctx.tenant_id))]
    pub async fn sale(
        &self,
        ctx: &TenantContext,
        request: StockRequest,
    ) -> Result<StockLevelChanged> {
        if let Some(prior) = self.replay(ctx).await? {
            return prior.into_stock();
        }
        request
            .validate()
            .map_err(|e| Error::Validation(e.to_string()))?;
        require_positive(request.quantity)?;
        let variant = self.require_variant(ctx.tenant_id, request.variant_id).await?;
        self.require_warehouse(ctx.tenant_id, request.warehouse_id).await?;

        let key = ItemKey::new(ctx.tenant_id, request.variant_id, request.warehouse_id);
        let guard = self.inner.locks.acquire(key).await;

        let mut item = self.load_item(ctx, request.variant_id, request.warehouse_id).await?;
        if !item.allow_negative_stock && item.available() < request.quantity {
            return Err(Error::InsufficientStock {
                requested: request.quantity,
                available: item.available(),
            });
        }

        let pre_available = item.available();
        let metadata = match request.reference_number {
            Some(ref reference) => MovementMetadata::for_sale(reference)
                .merged_with(request.metadata.unwrap_or_default()),
            None => request.metadata.unwrap_or_default(),
        };
        let draft = MovementDraft {
            kind: MovementKind::Sale,
            delta: -request.quantity,
            reason: request.reason,
            reference_number: request.reference_number,
            metadata,
            timestamp: Utc::now(),
        };
        let changed = self
            .commit_and_publish(ctx, &mut item, draft, false, &variant, pre_available)
            .await?;
        drop(guard);

        self.record_outcome(ctx, &OperationOutcome::Stock(changed.clone()))
            .await?;
        Ok(changed)
    }

    /// Return previously sold stock. The refund is validated against the
    /// sold total recorded under `original_sale_reference`; refunding more
    /// than was sold fails with `REFUND_EXCEEDS_SALE`.
    #[instrument(skip(self, ctx, request), fields(tenant = %ctx.tenant_id))]
    pub async fn refund(
        &self,
        ctx: &TenantContext,
        request: RefundRequest,
    ) -> Result<StockLevelChanged> {
        if let Some(prior) = self.replay(ctx).await? {
            return prior.into_stock();
        }
        request
            .validate()
            .map_err(|e| Error::Validation(e.to_string()))?;
        require_positive(request.quantity)?;
        let variant = self.require_variant(ctx.tenant_id, request.variant_id).await?;
        self.require_warehouse(ctx.tenant_id, request.warehouse_id).await?;

        let key = ItemKey::new(ctx.tenant_id, request.variant_id, request.warehouse_id);
        let guard = self.inner.locks.acquire(key).await;

        let mut item = self.load_item(ctx, request.variant_id, request.warehouse_id).await?;
        let totals = self
            .inner
            .store
            .refund_totals(ctx.tenant_id, item.id, &request.original_sale_reference)
            .await?;
        if request.quantity > totals.remaining() {
            return Err(Error::RefundExceedsSale {
                reference: request.original_sale_reference,
                requested: request.quantity,
                remaining: totals.remaining(),
            });
        }

        let pre_available = item.available();
        let draft = MovementDraft {
            kind: MovementKind::Refund,
            delta: request.quantity,
            reason: request.reason,
            reference_number: Some(request.original_sale_reference.clone()),
            metadata: MovementMetadata::for_refund(&request.original_sale_reference)
                .merged_with(request.metadata.unwrap_or_default()),
            timestamp: Utc::now(),
        };
        let changed = self
            .commit_and_publish(ctx, &mut item, draft, false, &variant, pre_available)
            .await?;
        drop(guard);

        self.record_outcome(ctx, &OperationOutcome::Stock(changed.clone()))
            .await?;
        Ok(changed)
    }

    /// Apply a signed correction. Zero fails with `INVALID_QUANTITY`; a
    /// negative adjustment that would drive total stock below zero fails
    /// with `NEGATIVE_STOCK_NOT_ALLOWED` unless the item permits it.
    #[instrument(skip(self, ctx, request), fields(tenant = %ctx.tenant_id))]
    pub async fn adjustment(
        &self,
        ctx: &TenantContext,
        request: StockRequest,
    ) -> Result<StockLevelChanged> {
        if let Some(prior) = self.replay(ctx).await? {
            return prior.into_stock();
        }
        request
            .validate()
            .map_err(|e| Error::Validation(e.to_string()))?;
        if request.quantity.is_zero() {
            return Err(Error::InvalidQuantity("adjustment of zero".into()));
        }
        let variant = self.require_variant(ctx.tenant_id, request.variant_id).await?;
        self.require_warehouse(ctx.tenant_id, request.warehouse_id).await?;

        let key = ItemKey::new(ctx.tenant_id, request.variant_id, request.warehouse_id);
        let guard = self.inner.locks.acquire(key).await;

        let mut item = self.load_item(ctx, request.variant_id, request.warehouse_id).await?;
        if !item.allow_negative_stock
            && item.total_stock.checked_add(request.quantity)?.is_negative()
        {
            return Err(Error::NegativeStockNotAllowed);
        }

        let pre_total = item.total_stock;
        let pre_available = item.available();
        let draft = MovementDraft {
            kind: MovementKind::Adjustment,
            delta: request.quantity,
            reason: request.reason,
            reference_number: request.reference_number,
            metadata: request.metadata.unwrap_or_default(),
            timestamp: Utc::now(),
        };
        let quantity = request.quantity;
        let changed = self
            .commit_and_publish(ctx, &mut item, draft, false, &variant, pre_available)
            .await?;
        drop(guard);

        self.raise_unusual_adjustment_alert(ctx, &variant, item.warehouse_id, pre_total, quantity)
            .await;
        self.record_outcome(ctx, &OperationOutcome::Stock(changed.clone()))
            .await?;
        Ok(changed)
    }

    /// Remove damaged or lost stock.
    #[instrument(skip(self, ctx, request), fields(tenant = %ctx.tenant_id))]
    pub async fn write_off(
        &self,
        ctx: &TenantContext,
        request: StockRequest,
    ) -> Result<StockLevelChanged> {
        if let Some(prior) = self.replay(ctx).await? {
            return prior.into_stock();
        }
        request
            .validate()
            .map_err(|e| Error::Validation(e.to_string()))?;
        require_positive(request.quantity)?;
        let variant = self.require_variant(ctx.tenant_id, request.variant_id).await?;
        self.require_warehouse(ctx.tenant_id, request.warehouse_id).await?;

        let key = ItemKey::new(ctx.tenant_id, request.variant_id, request.warehouse_id);
        let guard = self.inner.locks.acquire(key).await;

        let mut item = self.load_item(ctx, request.variant_id, request.warehouse_id).await?;
        if !item.allow_negative_stock && item.total_stock < request.quantity {
            return Err(Error::InsufficientStock {
                requested: request.quantity,
                available: item.total_stock,
            });
        }

        let pre_available = item.available();
        let draft = MovementDraft {
            kind: MovementKind::WriteOff,
            delta: -request.quantity,
            reason: request.reason,
            reference_number: request.reference_number,
            metadata: request.metadata.unwrap_or_default(),
            timestamp: Utc::now(),
        };
        let changed = self
            .commit_and_publish(ctx, &mut item, draft, false, &variant, pre_available)
            .await?;
        drop(guard);

        self.record_outcome(ctx, &OperationOutcome::Stock(changed.clone()))
            .await?;
        Ok(changed)
    }

    /// Move stock between warehouses atomically: a TransferOut on the
    /// source and a TransferIn on the destination share one reference
    /// token and commit in one transaction. The destination item is
    /// auto-created with the source's negative-stock policy and expiry.
    #[instrument(skip(self, ctx, request), fields(tenant = %ctx.tenant_id))]
    pub async fn transfer(
        &self,
        ctx: &TenantContext,
        request: TransferRequest,
    ) -> Result<TransferOutcome> {
        if let Some(prior) = self.replay(ctx).await? {
            let (source, destination) = prior.into_transfer()?;
            return Ok(TransferOutcome {
                source,
                destination,
            });
        }
        request
            .validate()
            .map_err(|e| Error::Validation(e.to_string()))?;
        require_positive(request.quantity)?;
        if request.source_warehouse_id == request.destination_warehouse_id {
            return Err(Error::InvalidWarehouseTransfer(
                "source and destination must differ".into(),
            ));
        }
        let variant = self.require_variant(ctx.tenant_id, request.variant_id).await?;
        self.require_warehouse(ctx.tenant_id, request.source_warehouse_id).await?;
        self.require_warehouse(ctx.tenant_id, request.destination_warehouse_id).await?;

        let source_key = ItemKey::new(ctx.tenant_id, request.variant_id, request.source_warehouse_id);
        let dest_key = ItemKey::new(
            ctx.tenant_id,
            request.variant_id,
            request.destination_warehouse_id,
        );
        let guards = self.inner.locks.acquire_pair(source_key, dest_key).await;

        let now = Utc::now();
        let mut source = self
            .load_item(ctx, request.variant_id, request.source_warehouse_id)
            .await?;
        // Transfers always require cover, regardless of the negative-stock
        // policy: stock that is not there cannot arrive elsewhere.
        if source.available() < request.quantity {
            return Err(Error::InsufficientStock {
                requested: request.quantity,
                available: source.available(),
            });
        }

        let existing_dest = self
            .inner
            .store
            .get_item(ctx.tenant_id, request.variant_id, request.destination_warehouse_id)
            .await?;
        let (mut destination, create_destination) = match existing_dest {
            Some(item) => (item, false),
            None => (
                InventoryItem::mirror_of(&source, request.destination_warehouse_id, now),
                true,
            ),
        };

        let reference = request
            .reference_number
            .unwrap_or_else(|| format!("TRF-{}", Uuid::new_v4().as_simple()));
        let metadata = MovementMetadata::for_transfer(
            request.source_warehouse_id,
            request.destination_warehouse_id,
        );

        let pre_source_available = source.available();
        let pre_dest_available = destination.available();

        let out_seq = source.movement_count;
        let out_balance = source.apply_delta(-request.quantity, now)?;
        let out_leg = build_movement(
            &source,
            MovementDraft {
                kind: MovementKind::TransferOut,
                delta: -request.quantity,
                reason: request.reason.clone(),
                reference_number: Some(reference.clone()),
                metadata: metadata.clone(),
                timestamp: now,
            },
            ctx,
            out_seq,
            out_balance,
        );

        let in_seq = destination.movement_count;
        let in_balance = destination.apply_delta(request.quantity, now)?;
        let in_leg = build_movement(
            &destination,
            MovementDraft {
                kind: MovementKind::TransferIn,
                delta: request.quantity,
                reason: request.reason,
                reference_number: Some(reference),
                metadata,
                timestamp: now,
            },
            ctx,
            in_seq,
            in_balance,
        );

        self.commit_transfer_with_policy(ctx, &source, &out_leg, &destination, &in_leg, create_destination)
            .await?;
        self.bump_operations();

        let source_changed = stock_changed_payload(&source, Some(&out_leg));
        let dest_changed = stock_changed_payload(&destination, Some(&in_leg));
        self.emit_stock_changed(ctx, source_changed.clone());
        self.emit_stock_changed(ctx, dest_changed.clone());
        self.raise_stock_level_alerts(ctx, &variant, &source, pre_source_available)
            .await;
        self.raise_stock_level_alerts(ctx, &variant, &destination, pre_dest_available)
            .await;
        drop(guards);

        self.inner
            .metrics
            .invalidate(ctx.tenant_id, Some(request.source_warehouse_id))
            .await;
        self.inner
            .metrics
            .invalidate(ctx.tenant_id, Some(request.destination_warehouse_id))
            .await;

        let outcome = TransferOutcome {
            source: source_changed,
            destination: dest_changed,
        };
        self.record_outcome(
            ctx,
            &OperationOutcome::Transfer {
                source: outcome.source.clone(),
                destination: outcome.destination.clone(),
            },
        )
        .await?;
        Ok(outcome)
    }

    /// Toggle whether the item may run a negative balance. Tightening the
    /// policy is refused while the current state already violates it.
    pub async fn set_negative_stock_policy(
        &self,
        ctx: &TenantContext,
        variant_id: VariantId,
        warehouse_id: WarehouseId,
        allow_negative_stock: bool,
    ) -> Result<()> {
        self.require_variant(ctx.tenant_id, variant_id).await?;
        self.require_warehouse(ctx.tenant_id, warehouse_id).await?;

        let key = ItemKey::new(ctx.tenant_id, variant_id, warehouse_id);
        let guard = self.inner.locks.acquire(key).await;

        let mut item = self.load_item(ctx, variant_id, warehouse_id).await?;
        if !allow_negative_stock
            && (item.total_stock.is_negative() || item.available().is_negative())
        {
            return Err(Error::NegativeStockNotAllowed);
        }
        item.allow_negative_stock = allow_negative_stock;
        item.updated_at = Utc::now();
        self.inner.store.update_item(&item).await?;
        drop(guard);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Shared plumbing
    // ------------------------------------------------------------------

    async fn inbound_op(
        &self,
        ctx: &TenantContext,
        request: StockRequest,
        kind: MovementKind,
    ) -> Result<StockLevelChanged> {
        if let Some(prior) = self.replay(ctx).await? {
            return prior.into_stock();
        }
        request
            .validate()
            .map_err(|e| Error::Validation(e.to_string()))?;
        require_positive(request.quantity)?;
        let variant = self.require_variant(ctx.tenant_id, request.variant_id).await?;
        self.require_warehouse(ctx.tenant_id, request.warehouse_id).await?;

        let key = ItemKey::new(ctx.tenant_id, request.variant_id, request.warehouse_id);
        let guard = self.inner.locks.acquire(key).await;

        let mut item = self.load_item(ctx, request.variant_id, request.warehouse_id).await?;
        let pre_available = item.available();
        let draft = MovementDraft {
            kind,
            delta: request.quantity,
            reason: request.reason,
            reference_number: request.reference_number,
            metadata: request.metadata.unwrap_or_default(),
            timestamp: Utc::now(),
        };
        let changed = self
            .commit_and_publish(ctx, &mut item, draft, false, &variant, pre_available)
            .await?;
        drop(guard);

        self.record_outcome(ctx, &OperationOutcome::Stock(changed.clone()))
            .await?;
        Ok(changed)
    }

    async fn load_item(
        &self,
        ctx: &TenantContext,
        variant_id: VariantId,
        warehouse_id: WarehouseId,
    ) -> Result<InventoryItem> {
        self.inner
            .store
            .get_item(ctx.tenant_id, variant_id, warehouse_id)
            .await?
            .ok_or(Error::InventoryNotFound)
    }

    /// Apply one movement to the projection, persist both atomically, and
    /// queue the resulting events. Caller holds the item lock.
    async fn commit_and_publish(
        &self,
        ctx: &TenantContext,
        item: &mut InventoryItem,
        draft: MovementDraft,
        create_item: bool,
        variant: &Variant,
        pre_available: Quantity,
    ) -> Result<StockLevelChanged> {
        let seq = item.movement_count;
        let running_balance = item.apply_delta(draft.delta, draft.timestamp)?;
        let movement = build_movement(item, draft, ctx, seq, running_balance);

        self.commit_movement_with_policy(ctx, item, &movement, create_item)
            .await?;
        self.bump_operations();

        let changed = stock_changed_payload(item, Some(&movement));
        self.emit_stock_changed(ctx, changed.clone());
        self.raise_stock_level_alerts(ctx, variant, item, pre_available)
            .await;
        self.inner
            .metrics
            .invalidate(ctx.tenant_id, Some(item.warehouse_id))
            .await;
        Ok(changed)
    }

    /// Commits are retried only for idempotent commands, i.e. when the
    /// caller supplied a correlation id.
    async fn commit_movement_with_policy(
        &self,
        ctx: &TenantContext,
        item: &InventoryItem,
        movement: &StockMovement,
        create_item: bool,
    ) -> Result<()> {
        if ctx.correlation_id.is_some() {
            with_retry(&self.inner.config.retry, "commit movement", || {
                self.inner.store.commit_movement(item, movement, create_item)
            })
            .await
        } else {
            self.inner
                .store
                .commit_movement(item, movement, create_item)
                .await
        }
    }

    async fn commit_transfer_with_policy(
        &self,
        ctx: &TenantContext,
        source: &InventoryItem,
        out_leg: &StockMovement,
        destination: &InventoryItem,
        in_leg: &StockMovement,
        create_destination: bool,
    ) -> Result<()> {
        if ctx.correlation_id.is_some() {
            with_retry(&self.inner.config.retry, "commit transfer", || {
                self.inner.store.commit_transfer(
                    source,
                    out_leg,
                    destination,
                    in_leg,
                    create_destination,
                )
            })
            .await
        } else {
            self.inner
                .store
                .commit_transfer(source, out_leg, destination, in_leg, create_destination)
                .await
        }
    }

    /// Queue the primary event onto the warehouse and variant groups.
    pub(crate) fn emit_stock_changed(&self, ctx: &TenantContext, changed: StockLevelChanged) {
        let groups = vec![
            GroupKey::Warehouse(ctx.tenant_id, changed.warehouse_id),
            GroupKey::Variant(ctx.tenant_id, changed.variant_id),
        ];
        let event = DomainEvent::builder(
            inventory_events::STOCK_LEVEL_CHANGED,
            changed.variant_id.as_uuid(),
            "InventoryItem",
            ctx.tenant_id,
        )
        .actor(ctx.actor_id)
        .correlation_id(ctx.correlation_id.unwrap_or_else(Uuid::new_v4))
        .data(&changed)
        .map(|b| b.build());
        match event {
            Ok(event) => self.inner.notifier.enqueue(Outbound::new(groups, event)),
            Err(err) => tracing::error!(error = %err, "failed to serialize stock event"),
        }
    }
}

fn require_positive(quantity: Quantity) -> Result<()> {
    if !quantity.is_positive() {
        return Err(Error::InvalidQuantity(
            "quantity must be strictly positive".into(),
        ));
    }
    Ok(())
}

fn build_movement(
    item: &InventoryItem,
    draft: MovementDraft,
    ctx: &TenantContext,
    seq: u64,
    running_balance: Quantity,
) -> StockMovement {
    StockMovement {
        id: MovementId::new(),
        tenant_id: item.tenant_id,
        item_id: item.id,
        variant_id: item.variant_id,
        warehouse_id: item.warehouse_id,
        kind: draft.kind,
        quantity: draft.delta,
        running_balance,
        actor_id: ctx.actor_id,
        timestamp_utc: draft.timestamp,
        seq,
        reason: draft.reason,
        reference_number: draft.reference_number,
        metadata: draft.metadata,
    }
}

pub(crate) fn stock_changed_payload(
    item: &InventoryItem,
    movement: Option<&StockMovement>,
) -> StockLevelChanged {
    StockLevelChanged {
        tenant_id: item.tenant_id,
        variant_id: item.variant_id,
        warehouse_id: item.warehouse_id,
        total_stock: item.total_stock,
        reserved_stock: item.reserved_stock,
        available_stock: item.available(),
        last_movement: movement.map(|m| MovementSummary {
            kind: m.kind,
            quantity: m.quantity,
            running_balance: m.running_balance,
            timestamp: m.timestamp_utc,
            reference_number: m.reference_number.clone(),
        }),
        timestamp: item.updated_at,
    }
}
