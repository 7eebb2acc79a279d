//! Optional Redis mirror. Committed events are re-published to their
//! tenant topic and appended to a per-aggregate stream so out-of-process
//! consumers (dashboard gateways, audit collectors) can attach without
//! touching the engine's in-process registry.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use stockbook_shared::error::{Error, Result};
use stockbook_shared::events::DomainEvent;

/// Retention of the replay streams, in seconds.
const STREAM_TTL_SECS: i64 = 30 * 24 * 60 * 60;

pub struct RedisEventBridge {
    redis: ConnectionManager,
}

impl RedisEventBridge {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::Infrastructure(format!("invalid redis URL: {e}")))?;
        let redis = ConnectionManager::new(client).await?;
        info!("redis event bridge connected");
        Ok(Self { redis })
    }

    /// Consume the dispatcher's mirror queue until it closes.
    pub async fn run(mut self, mut rx: mpsc::Receiver<DomainEvent>) {
        while let Some(event) = rx.recv().await {
            if let Err(err) = self.mirror(&event).await {
                // Mirroring is best-effort; the in-process delivery already
                // happened.
                error!(event_id = %event.id, error = %err, "failed to mirror event");
            }
        }
        debug!("redis event bridge stopped");
    }

    async fn mirror(&mut self, event: &DomainEvent) -> Result<()> {
        let payload = serde_json::to_string(event)?;

        let _: i64 = self.redis.publish(event.topic(), &payload).await?;
        let _: i64 = self.redis.publish(event.tenant_topic(), &payload).await?;

        let stream = event.stream_name();
        let _: String = redis::cmd("XADD")
            .arg(&stream)
            .arg("*")
            .arg("event")
            .arg(&payload)
            .arg("type")
            .arg(&event.event_type)
            .arg("tenant_id")
            .arg(event.tenant_id.to_string())
            .arg("occurred_at")
            .arg(event.occurred_at.timestamp())
            .query_async(&mut self.redis)
            .await?;

        let expire: std::result::Result<(), redis::RedisError> = redis::cmd("EXPIRE")
            .arg(&stream)
            .arg(STREAM_TTL_SECS)
            .query_async(&mut self.redis)
            .await;
        if let Err(err) = expire {
            warn!(stream, error = %err, "failed to refresh stream TTL");
        }

        Ok(())
    }
}
