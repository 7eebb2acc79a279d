// ============================================================================
// STOCKBOOK - NOTIFICATION FAN-OUT
// ============================================================================
// Module: engine/src/notify.rs
// Description: Subscriber groups and the dispatcher that drains the commit
//              path's event queue. Delivery is best-effort while connected;
//              the committing operation never blocks on a subscriber.
// ============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

use stockbook_shared::config::EngineConfig;
use stockbook_shared::events::{DomainEvent, GroupKey, MetricsScope};
use stockbook_shared::ids::TenantId;

/// One event queued by the commit path, addressed to its groups. Dashboard
/// updates additionally carry a coalescing key.
#[derive(Debug)]
pub struct Outbound {
    pub groups: Vec<GroupKey>,
    pub event: DomainEvent,
    pub coalesce: Option<(TenantId, MetricsScope)>,
}

impl Outbound {
    pub fn new(groups: Vec<GroupKey>, event: DomainEvent) -> Self {
        Self {
            groups,
            event,
            coalesce: None,
        }
    }

    pub fn coalesced(
        groups: Vec<GroupKey>,
        event: DomainEvent,
        key: (TenantId, MetricsScope),
    ) -> Self {
        Self {
            groups,
            event,
            coalesce: Some(key),
        }
    }
}

/// Group registry plus the internal queue. Cloneable handle; the dispatcher
/// task owns the receiving end.
#[derive(Clone)]
pub struct Notifier {
    registry: Arc<RwLock<HashMap<GroupKey, broadcast::Sender<Arc<DomainEvent>>>>>,
    queue_tx: mpsc::Sender<Outbound>,
    subscriber_buffer: usize,
    published: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

impl Notifier {
    /// Build the notifier and its dispatcher task. The dispatcher drains
    /// and exits on the shutdown signal, or earlier if every `Notifier`
    /// clone is dropped.
    pub fn start(
        config: &EngineConfig,
        bridge_tx: Option<mpsc::Sender<DomainEvent>>,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, tokio::task::JoinHandle<()>) {
        let (queue_tx, queue_rx) = mpsc::channel(config.event_queue_capacity);
        let notifier = Self {
            registry: Arc::new(RwLock::new(HashMap::new())),
            queue_tx,
            subscriber_buffer: config.subscriber_buffer,
            published: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
        };

        let dispatcher = Dispatcher {
            registry: Arc::clone(&notifier.registry),
            published: Arc::clone(&notifier.published),
            window: config.dashboard_coalescing_window,
            pending: HashMap::new(),
            last_emit: HashMap::new(),
            bridge_tx,
        };
        let handle = tokio::spawn(dispatcher.run(queue_rx, shutdown));
        (notifier, handle)
    }

    /// Queue an event for delivery. Called on the commit path, possibly
    /// under the item lock; never blocks and never fails the operation.
    pub fn enqueue(&self, outbound: Outbound) {
        if let Err(err) = self.queue_tx.try_send(outbound) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(error = %err, "event queue full, notification dropped");
        }
    }

    /// Attach to a group. The receiver sees everything published to the
    /// group from now on; reconnecting subscribers re-request a snapshot
    /// through the engine's read surface.
    pub async fn subscribe(&self, group: GroupKey) -> broadcast::Receiver<Arc<DomainEvent>> {
        let mut registry = self.registry.write().await;
        registry
            .entry(group)
            .or_insert_with(|| broadcast::channel(self.subscriber_buffer).0)
            .subscribe()
    }

    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

struct Dispatcher {
    registry: Arc<RwLock<HashMap<GroupKey, broadcast::Sender<Arc<DomainEvent>>>>>,
    published: Arc<AtomicU64>,
    window: Duration,
    /// Latest update per coalescing key, held back until the window opens.
    pending: HashMap<(TenantId, MetricsScope), Outbound>,
    last_emit: HashMap<(TenantId, MetricsScope), Instant>,
    bridge_tx: Option<mpsc::Sender<DomainEvent>>,
}

impl Dispatcher {
    async fn run(mut self, mut queue_rx: mpsc::Receiver<Outbound>, mut shutdown: watch::Receiver<bool>) {
        let mut flush_timer = tokio::time::interval(self.window.max(Duration::from_millis(10)));
        loop {
            tokio::select! {
                received = queue_rx.recv() => {
                    match received {
                        Some(outbound) => self.handle(outbound).await,
                        None => break,
                    }
                }
                _ = flush_timer.tick() => {
                    self.flush_due().await;
                }
                changed = shutdown.changed() => {
                    // A dropped sender means the engine is gone.
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        // Drain: deliver queued and held-back events before exiting.
        while let Ok(outbound) = queue_rx.try_recv() {
            self.publish(outbound).await;
        }
        let remaining: Vec<Outbound> = self.pending.drain().map(|(_, v)| v).collect();
        for outbound in remaining {
            self.publish(outbound).await;
        }
        debug!("notification dispatcher stopped");
    }

    async fn handle(&mut self, outbound: Outbound) {
        match outbound.coalesce {
            Some(key) => {
                let elapsed = self
                    .last_emit
                    .get(&key)
                    .map(|at| at.elapsed())
                    .unwrap_or(self.window);
                if elapsed >= self.window {
                    self.last_emit.insert(key, Instant::now());
                    self.publish(outbound).await;
                } else {
                    // Latest update wins within the window.
                    self.pending.insert(key, outbound);
                }
            }
            None => self.publish(outbound).await,
        }
    }

    async fn flush_due(&mut self) {
        let due: Vec<(TenantId, MetricsScope)> = self
            .pending
            .keys()
            .filter(|key| {
                self.last_emit
                    .get(key)
                    .map(|at| at.elapsed() >= self.window)
                    .unwrap_or(true)
            })
            .copied()
            .collect();
        for key in due {
            if let Some(outbound) = self.pending.remove(&key) {
                self.last_emit.insert(key, Instant::now());
                self.publish(outbound).await;
            }
        }
    }

    async fn publish(&self, outbound: Outbound) {
        if let Some(ref bridge) = self.bridge_tx {
            if bridge.try_send(outbound.event.clone()).is_err() {
                debug!("redis bridge backlogged, event not mirrored");
            }
        }
        let event = Arc::new(outbound.event);
        let registry = self.registry.read().await;
        for group in &outbound.groups {
            if let Some(sender) = registry.get(group) {
                // A send error only means the group has no live receivers.
                let _ = sender.send(Arc::clone(&event));
            }
        }
        self.published.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockbook_shared::events::inventory_events;
    use stockbook_shared::ids::WarehouseId;
    use uuid::Uuid;

    fn event(tenant: TenantId, event_type: &str) -> DomainEvent {
        DomainEvent::builder(event_type, Uuid::new_v4(), "InventoryItem", tenant).build()
    }

    #[tokio::test]
    async fn test_events_reach_only_their_groups() {
        let config = EngineConfig::default();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (notifier, _handle) = Notifier::start(&config, None, shutdown_rx);

        let tenant = TenantId::new();
        let warehouse = WarehouseId::new();
        let group = GroupKey::Warehouse(tenant, warehouse);
        let other_group = GroupKey::Warehouse(tenant, WarehouseId::new());

        let mut rx = notifier.subscribe(group).await;
        let mut other_rx = notifier.subscribe(other_group).await;

        notifier.enqueue(Outbound::new(
            vec![group],
            event(tenant, inventory_events::STOCK_LEVEL_CHANGED),
        ));

        let delivered = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("delivery timed out")
            .unwrap();
        assert_eq!(delivered.event_type, inventory_events::STOCK_LEVEL_CHANGED);

        assert!(tokio::time::timeout(Duration::from_millis(50), other_rx.recv())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_dashboard_updates_are_coalesced() {
        let mut config = EngineConfig::default();
        config.dashboard_coalescing_window = Duration::from_millis(80);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (notifier, _handle) = Notifier::start(&config, None, shutdown_rx);

        let tenant = TenantId::new();
        let group = GroupKey::Dashboard(tenant);
        let key = (tenant, MetricsScope::Global);
        let mut rx = notifier.subscribe(group).await;

        for _ in 0..5 {
            notifier.enqueue(Outbound::coalesced(
                vec![group],
                event(tenant, inventory_events::DASHBOARD_METRICS_UPDATED),
                key,
            ));
        }

        // First one passes immediately; the burst collapses into one more
        // emission when the window reopens.
        let mut received = 0;
        while tokio::time::timeout(Duration::from_millis(300), rx.recv())
            .await
            .is_ok()
        {
            received += 1;
        }
        assert_eq!(received, 2);
    }

    #[tokio::test]
    async fn test_enqueue_never_blocks() {
        let mut config = EngineConfig::default();
        config.event_queue_capacity = 1;
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (notifier, handle) = Notifier::start(&config, None, shutdown_rx);
        handle.abort(); // dispatcher gone: queue fills and stays full

        let tenant = TenantId::new();
        for _ in 0..10 {
            notifier.enqueue(Outbound::new(
                vec![GroupKey::Dashboard(tenant)],
                event(tenant, inventory_events::STOCK_LEVEL_CHANGED),
            ));
        }
        assert!(notifier.dropped_count() >= 8);
    }
}
