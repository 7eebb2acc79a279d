// ============================================================================
// STOCKBOOK - ENGINE BEHAVIOR TESTS
// ============================================================================
// Module: engine/tests/engine_behaviors.rs
// Description: Idempotent replay, refund validation, fulfillment flow,
//              alert crossings, dashboard metrics and fan-out delivery.
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use stockbook_engine::models::{MovementFilter, Variant, Warehouse};
use stockbook_engine::{
    CreateReservationRequest, CreateVariantRequest, InMemoryStore, InventoryEngine,
    OpeningBalanceRequest, RefundRequest, StockRequest,
};
use stockbook_shared::config::EngineConfig;
use stockbook_shared::context::TenantContext;
use stockbook_shared::events::{
    AlertKind, GroupKey, MetricsPeriod, MetricsScope, ReservationStatus,
};
use stockbook_shared::ids::{ActorId, TenantId};
use stockbook_shared::quantity::Quantity;
use stockbook_shared::units::UnitOfMeasure;

struct TestBed {
    engine: InventoryEngine,
    ctx: TenantContext,
    variant: Variant,
    warehouse: Warehouse,
}

async fn setup_with_config(config: EngineConfig) -> TestBed {
    let engine = InventoryEngine::start(Arc::new(InMemoryStore::new()), config)
        .await
        .unwrap();
    let ctx = TenantContext::new(TenantId::new(), ActorId::new());

    let product = engine.create_product(&ctx, "Widget".into()).await.unwrap();
    let variant = engine
        .create_variant(
            &ctx,
            CreateVariantRequest {
                product_id: product.id,
                sku: "WIDGET-001".into(),
                name: "Widget".into(),
                base_unit: UnitOfMeasure::Each,
            },
        )
        .await
        .unwrap();
    let warehouse = engine.register_warehouse(&ctx, "MAIN".into()).await.unwrap();

    TestBed {
        engine,
        ctx,
        variant,
        warehouse,
    }
}

async fn setup() -> TestBed {
    setup_with_config(EngineConfig::default()).await
}

fn units(value: i64) -> Quantity {
    Quantity::from_units(value)
}

impl TestBed {
    async fn open(&self, quantity: i64) {
        self.engine
            .opening_balance(
                &self.ctx,
                OpeningBalanceRequest {
                    variant_id: self.variant.id,
                    warehouse_id: self.warehouse.id,
                    quantity: units(quantity),
                    reason: "opening".into(),
                    reference_number: None,
                    metadata: None,
                    allow_negative_stock: false,
                    expiry_date: None,
                },
            )
            .await
            .unwrap();
    }

    async fn movement_count(&self) -> usize {
        self.engine
            .list_movements(
                &self.ctx,
                self.variant.id,
                self.warehouse.id,
                MovementFilter::default(),
            )
            .await
            .unwrap()
            .len()
    }
}

#[rstest::rstest]
#[case::sale("sale")]
#[case::write_off("write_off")]
#[case::transfer("transfer")]
#[tokio::test]
async fn test_outbound_operations_require_cover(#[case] operation: &str) {
    let bed = setup().await;
    bed.open(10).await;
    let oversized = units(11);

    let err = match operation {
        "sale" => bed
            .engine
            .sale(
                &bed.ctx,
                StockRequest::new(bed.variant.id, bed.warehouse.id, oversized, "oversell"),
            )
            .await
            .unwrap_err(),
        "write_off" => bed
            .engine
            .write_off(
                &bed.ctx,
                StockRequest::new(bed.variant.id, bed.warehouse.id, oversized, "overscrap"),
            )
            .await
            .unwrap_err(),
        "transfer" => {
            let other = bed
                .engine
                .register_warehouse(&bed.ctx, "OVERFLOW".into())
                .await
                .unwrap();
            bed.engine
                .transfer(
                    &bed.ctx,
                    stockbook_engine::TransferRequest {
                        variant_id: bed.variant.id,
                        source_warehouse_id: bed.warehouse.id,
                        destination_warehouse_id: other.id,
                        quantity: oversized,
                        reason: "overmove".into(),
                        reference_number: None,
                    },
                )
                .await
                .unwrap_err()
        }
        _ => unreachable!(),
    };
    assert_eq!(err.code(), "INSUFFICIENT_STOCK");

    let level = bed
        .engine
        .stock_level(&bed.ctx, bed.variant.id, bed.warehouse.id)
        .await
        .unwrap();
    assert_eq!(level.total_stock, units(10));
}

#[tokio::test]
async fn test_same_correlation_id_commits_once() {
    let bed = setup().await;
    bed.open(100).await;

    let ctx = bed.ctx.with_correlation(Uuid::new_v4());
    let request =
        StockRequest::new(bed.variant.id, bed.warehouse.id, units(25), "restock delivery");

    let first = bed.engine.purchase(&ctx, request.clone()).await.unwrap();
    let second = bed.engine.purchase(&ctx, request).await.unwrap();

    // Identical result, exactly one side effect.
    assert_eq!(first.total_stock, second.total_stock);
    assert_eq!(first.last_movement, second.last_movement);
    assert_eq!(bed.movement_count().await, 2); // opening + one purchase

    let level = bed
        .engine
        .stock_level(&bed.ctx, bed.variant.id, bed.warehouse.id)
        .await
        .unwrap();
    assert_eq!(level.total_stock, units(125));
}

#[tokio::test]
async fn test_correlation_ids_are_tenant_scoped() {
    let bed = setup().await;
    bed.open(100).await;
    let correlation = Uuid::new_v4();

    let ctx = bed.ctx.with_correlation(correlation);
    bed.engine
        .purchase(
            &ctx,
            StockRequest::new(bed.variant.id, bed.warehouse.id, units(5), "restock"),
        )
        .await
        .unwrap();

    // A different tenant reusing the same correlation id is not replayed.
    let ctx_two = TenantContext::new(TenantId::new(), ActorId::new()).with_correlation(correlation);
    let err = bed
        .engine
        .purchase(
            &ctx_two,
            StockRequest::new(bed.variant.id, bed.warehouse.id, units(5), "restock"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VARIANT_NOT_FOUND");
}

#[tokio::test]
async fn test_refund_cannot_exceed_sale() {
    let bed = setup().await;
    bed.open(100).await;

    bed.engine
        .sale(
            &bed.ctx,
            StockRequest::new(bed.variant.id, bed.warehouse.id, units(30), "order shipped")
                .with_reference("SO-1"),
        )
        .await
        .unwrap();

    // First refund within bounds.
    bed.engine
        .refund(
            &bed.ctx,
            RefundRequest {
                variant_id: bed.variant.id,
                warehouse_id: bed.warehouse.id,
                quantity: units(20),
                reason: "partial return".into(),
                original_sale_reference: "SO-1".into(),
                metadata: None,
            },
        )
        .await
        .unwrap();

    // 20 of 30 already refunded; 15 more would exceed the sale.
    let err = bed
        .engine
        .refund(
            &bed.ctx,
            RefundRequest {
                variant_id: bed.variant.id,
                warehouse_id: bed.warehouse.id,
                quantity: units(15),
                reason: "second return".into(),
                original_sale_reference: "SO-1".into(),
                metadata: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "REFUND_EXCEEDS_SALE");

    // A reference that never sold anything cannot be refunded at all.
    let err = bed
        .engine
        .refund(
            &bed.ctx,
            RefundRequest {
                variant_id: bed.variant.id,
                warehouse_id: bed.warehouse.id,
                quantity: units(1),
                reason: "phantom return".into(),
                original_sale_reference: "SO-UNKNOWN".into(),
                metadata: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "REFUND_EXCEEDS_SALE");
}

#[tokio::test]
async fn test_fulfillment_releases_reserved_without_moving_stock() {
    let bed = setup().await;
    bed.open(1000).await;

    let created = bed
        .engine
        .create_reservation(
            &bed.ctx,
            CreateReservationRequest {
                variant_id: bed.variant.id,
                warehouse_id: bed.warehouse.id,
                quantity: units(100),
                expires_at_utc: Utc::now() + chrono::Duration::days(7),
                reference_number: "ORDER-77".into(),
                notes: None,
            },
        )
        .await
        .unwrap();

    let partial = bed
        .engine
        .fulfill_reservation(&bed.ctx, created.reservation_id, units(40))
        .await
        .unwrap();
    assert_eq!(partial.status, ReservationStatus::PartiallyFulfilled);
    assert_eq!(partial.fulfilled_quantity, units(40));

    // Fulfillment released the slice but did not move stock; the matching
    // sale is its own command.
    let level = bed
        .engine
        .stock_level(&bed.ctx, bed.variant.id, bed.warehouse.id)
        .await
        .unwrap();
    assert_eq!(level.total_stock, units(1000));
    assert_eq!(level.reserved_stock, units(60));
    assert_eq!(bed.movement_count().await, 1); // opening only

    bed.engine
        .sale(
            &bed.ctx,
            StockRequest::new(bed.variant.id, bed.warehouse.id, units(40), "fulfillment shipped")
                .with_reference("ORDER-77"),
        )
        .await
        .unwrap();

    let full = bed
        .engine
        .fulfill_reservation(&bed.ctx, created.reservation_id, units(60))
        .await
        .unwrap();
    assert_eq!(full.status, ReservationStatus::Fulfilled);

    let level = bed
        .engine
        .stock_level(&bed.ctx, bed.variant.id, bed.warehouse.id)
        .await
        .unwrap();
    assert_eq!(level.total_stock, units(960));
    assert_eq!(level.reserved_stock, Quantity::ZERO);
}

#[tokio::test]
async fn test_low_stock_and_out_of_stock_alerts_on_crossing() {
    let bed = setup().await;
    bed.engine
        .set_low_stock_threshold(&bed.ctx, bed.variant.id, Some(units(20)))
        .await
        .unwrap();
    bed.open(100).await;

    let mut alert_rx = bed
        .engine
        .subscribe(
            &bed.ctx,
            GroupKey::Alerts(bed.ctx.tenant_id, AlertKind::LowStock),
        )
        .await
        .unwrap();

    // 100 -> 15 crosses the threshold once.
    bed.engine
        .sale(
            &bed.ctx,
            StockRequest::new(bed.variant.id, bed.warehouse.id, units(85), "bulk order"),
        )
        .await
        .unwrap();
    // Still below threshold: no second alert while the first is open.
    bed.engine
        .sale(
            &bed.ctx,
            StockRequest::new(bed.variant.id, bed.warehouse.id, units(5), "small order"),
        )
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(1), alert_rx.recv())
        .await
        .expect("low stock alert not delivered")
        .unwrap();
    assert_eq!(event.event_type, "AlertRaised");

    let alerts = bed.engine.list_alerts(&bed.ctx, false).await.unwrap();
    let low: Vec<_> = alerts.iter().filter(|a| a.kind == AlertKind::LowStock).collect();
    assert_eq!(low.len(), 1);

    // Draining the rest raises OutOfStock.
    bed.engine
        .sale(
            &bed.ctx,
            StockRequest::new(bed.variant.id, bed.warehouse.id, units(10), "sell out"),
        )
        .await
        .unwrap();
    let alerts = bed.engine.list_alerts(&bed.ctx, false).await.unwrap();
    assert!(alerts.iter().any(|a| a.kind == AlertKind::OutOfStock));

    // Acknowledging clears it from the open list.
    let out = alerts
        .iter()
        .find(|a| a.kind == AlertKind::OutOfStock)
        .unwrap();
    bed.engine.acknowledge_alert(&bed.ctx, out.id).await.unwrap();
    let open = bed.engine.list_alerts(&bed.ctx, false).await.unwrap();
    assert!(!open.iter().any(|a| a.kind == AlertKind::OutOfStock));
}

#[tokio::test]
async fn test_unusual_adjustment_alert() {
    let bed = setup().await;
    bed.open(1000).await;

    bed.engine
        .adjustment(
            &bed.ctx,
            StockRequest::new(bed.variant.id, bed.warehouse.id, units(-600), "inventory recount"),
        )
        .await
        .unwrap();

    let alerts = bed.engine.list_alerts(&bed.ctx, false).await.unwrap();
    assert!(alerts
        .iter()
        .any(|a| a.kind == AlertKind::UnusualAdjustment));
}

#[tokio::test]
async fn test_dashboard_metrics_reflect_commits() {
    let bed = setup().await;
    bed.engine
        .set_unit_cost(&bed.ctx, bed.variant.id, Some(rust_decimal::Decimal::new(250, 2)))
        .await
        .unwrap();
    bed.open(200).await;

    let metrics = bed
        .engine
        .dashboard_metrics(&bed.ctx, MetricsScope::Global, MetricsPeriod::Day)
        .await
        .unwrap();
    assert_eq!(metrics.total_available_stock, units(200));
    assert_eq!(metrics.total_reserved_stock, Quantity::ZERO);
    assert_eq!(
        metrics.total_stock_value,
        Some(rust_decimal::Decimal::new(500_00, 2))
    );
    assert_eq!(metrics.movement_rates.daily.inbound, units(200));
    assert_eq!(metrics.warehouse_breakdown.len(), 1);

    // A commit invalidates the cached entry; the next read recomputes.
    bed.engine
        .sale(
            &bed.ctx,
            StockRequest::new(bed.variant.id, bed.warehouse.id, units(50), "order"),
        )
        .await
        .unwrap();
    let metrics = bed
        .engine
        .dashboard_metrics(&bed.ctx, MetricsScope::Global, MetricsPeriod::Day)
        .await
        .unwrap();
    assert_eq!(metrics.total_available_stock, units(150));
    assert_eq!(metrics.movement_rates.daily.outbound, units(50));

    // Warehouse scope matches the single warehouse.
    let scoped = bed
        .engine
        .dashboard_metrics(
            &bed.ctx,
            MetricsScope::ByWarehouse(bed.warehouse.id),
            MetricsPeriod::Hour,
        )
        .await
        .unwrap();
    assert_eq!(scoped.total_available_stock, units(150));
}

#[tokio::test]
async fn test_stock_level_changed_fan_out() {
    let bed = setup().await;
    bed.open(10).await;

    let warehouse_group = GroupKey::Warehouse(bed.ctx.tenant_id, bed.warehouse.id);
    let variant_group = GroupKey::Variant(bed.ctx.tenant_id, bed.variant.id);
    let mut warehouse_rx = bed.engine.subscribe(&bed.ctx, warehouse_group).await.unwrap();
    let mut variant_rx = bed.engine.subscribe(&bed.ctx, variant_group).await.unwrap();

    bed.engine
        .purchase(
            &bed.ctx,
            StockRequest::new(bed.variant.id, bed.warehouse.id, units(5), "restock"),
        )
        .await
        .unwrap();

    for rx in [&mut warehouse_rx, &mut variant_rx] {
        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("event not delivered")
            .unwrap();
        assert_eq!(event.event_type, "StockLevelChanged");
        assert_eq!(event.tenant_id, bed.ctx.tenant_id);
        let total = event.data["total_stock"].as_str().unwrap();
        assert_eq!(total, "15");
    }

    // Cross-tenant subscription attempts are rejected.
    let foreign_ctx = TenantContext::new(TenantId::new(), ActorId::new());
    let err = bed
        .engine
        .subscribe(&foreign_ctx, warehouse_group)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN");
}

#[tokio::test]
async fn test_audit_confirms_ledger_and_reservation_invariants() {
    let bed = setup().await;
    bed.open(1000).await;

    bed.engine
        .purchase(
            &bed.ctx,
            StockRequest::new(bed.variant.id, bed.warehouse.id, units(250), "restock")
                .with_reference("PO-9"),
        )
        .await
        .unwrap();
    bed.engine
        .sale(
            &bed.ctx,
            StockRequest::new(bed.variant.id, bed.warehouse.id, units(400), "order")
                .with_reference("SO-9"),
        )
        .await
        .unwrap();
    let created = bed
        .engine
        .create_reservation(
            &bed.ctx,
            CreateReservationRequest {
                variant_id: bed.variant.id,
                warehouse_id: bed.warehouse.id,
                quantity: units(120),
                expires_at_utc: Utc::now() + chrono::Duration::days(2),
                reference_number: "ORDER-9".into(),
                notes: None,
            },
        )
        .await
        .unwrap();
    bed.engine
        .fulfill_reservation(&bed.ctx, created.reservation_id, units(20))
        .await
        .unwrap();

    let reports = bed.engine.audit_tenant(&bed.ctx).await.unwrap();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert!(report.is_consistent());
    assert_eq!(report.ledger_total, units(850));
    assert_eq!(report.outstanding_reserved, units(100));
    assert_eq!(report.movement_count, 3);
}

#[tokio::test]
async fn test_unit_conversions_are_display_metadata() {
    let bed = setup().await;
    bed.engine
        .add_unit_conversion(
            &bed.ctx,
            bed.variant.id,
            stockbook_shared::units::UnitOfMeasure::Dozen,
            stockbook_shared::units::UnitOfMeasure::Each,
            rust_decimal::Decimal::from(12),
        )
        .await
        .unwrap();
    bed.open(100).await;

    let converted = bed
        .engine
        .convert_display_quantity(
            &bed.ctx,
            bed.variant.id,
            units(3),
            stockbook_shared::units::UnitOfMeasure::Dozen,
            stockbook_shared::units::UnitOfMeasure::Each,
        )
        .await
        .unwrap();
    assert_eq!(converted, units(36));

    // Unregistered pairs are rejected.
    let err = bed
        .engine
        .convert_display_quantity(
            &bed.ctx,
            bed.variant.id,
            units(1),
            stockbook_shared::units::UnitOfMeasure::Case,
            stockbook_shared::units::UnitOfMeasure::Each,
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "UNIT_CONVERSION_NOT_FOUND");

    // Conversions never touched the ledger.
    let level = bed
        .engine
        .stock_level(&bed.ctx, bed.variant.id, bed.warehouse.id)
        .await
        .unwrap();
    assert_eq!(level.total_stock, units(100));
}

#[tokio::test]
async fn test_workers_start_and_drain() {
    let mut config = EngineConfig::default();
    config.sweep_interval = Duration::from_millis(50);
    config.metrics_refresh_interval = Duration::from_millis(50);
    config.alert_detector_interval = Duration::from_millis(50);
    let bed = setup_with_config(config).await;
    bed.open(500).await;

    bed.engine.spawn_workers().await.unwrap();

    // A short-lived reservation is picked up by the running sweeper.
    bed.engine
        .create_reservation(
            &bed.ctx,
            CreateReservationRequest {
                variant_id: bed.variant.id,
                warehouse_id: bed.warehouse.id,
                quantity: units(50),
                expires_at_utc: Utc::now() + chrono::Duration::milliseconds(40),
                reference_number: "ORDER-SHORT".into(),
                notes: None,
            },
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;
    let level = bed
        .engine
        .stock_level(&bed.ctx, bed.variant.id, bed.warehouse.id)
        .await
        .unwrap();
    assert_eq!(level.reserved_stock, Quantity::ZERO);

    bed.engine.shutdown().await;
}
