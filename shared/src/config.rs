use rust_decimal::Decimal;
use std::time::Duration;

/// Engine tuning knobs. Plain values with defaults; loading them from files
/// or the environment is an adapter concern.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Fixed interval between expiry-sweeper ticks.
    pub sweep_interval: Duration,
    /// Upper bound on reservations expired in a single sweeper tick.
    pub sweep_batch_limit: usize,
    /// TTL applied to computed dashboard metrics entries.
    pub metrics_ttl: Duration,
    /// Interval of the background metrics refresher.
    pub metrics_refresh_interval: Duration,
    /// Shard count of the metrics cache lock array.
    pub metrics_cache_shards: usize,
    /// Minimum spacing between DashboardMetricsUpdated emissions for one
    /// (tenant, scope).
    pub dashboard_coalescing_window: Duration,
    /// Lock-pool entries kept across idle periods before eviction runs.
    pub lock_pool_capacity: usize,
    /// Buffered events between the commit path and the dispatcher.
    pub event_queue_capacity: usize,
    /// Per-group broadcast buffer for slow subscribers.
    pub subscriber_buffer: usize,
    /// Interval of the alert detector (expiring stock / reservations).
    pub alert_detector_interval: Duration,
    /// Lead time before reservation expiry that raises ReservationExpiring.
    pub reservation_expiring_lead: Duration,
    /// Lead time before item expiry that marks stock as expiring.
    pub stock_expiring_lead: Duration,
    /// An adjustment whose magnitude reaches this share of the pre-existing
    /// stock raises an UnusualAdjustment alert.
    pub unusual_adjustment_ratio: Decimal,
    /// Retry policy for retryable storage failures.
    pub retry: RetryConfig,
    /// Optional Redis URL; when set, committed events are mirrored to
    /// tenant topics out of process.
    pub redis_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(30),
            sweep_batch_limit: 500,
            metrics_ttl: Duration::from_secs(300),
            metrics_refresh_interval: Duration::from_secs(60),
            metrics_cache_shards: 16,
            dashboard_coalescing_window: Duration::from_secs(1),
            lock_pool_capacity: 4096,
            event_queue_capacity: 8192,
            subscriber_buffer: 256,
            alert_detector_interval: Duration::from_secs(60),
            reservation_expiring_lead: Duration::from_secs(15 * 60),
            stock_expiring_lead: Duration::from_secs(7 * 24 * 3600),
            unusual_adjustment_ratio: Decimal::new(5, 1),
            retry: RetryConfig::default(),
            redis_url: None,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
        }
    }
}
