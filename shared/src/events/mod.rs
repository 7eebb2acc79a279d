// ============================================================================
// STOCKBOOK - DOMAIN EVENTS
// ============================================================================
// Module: shared/src/events/mod.rs
// Description: Event envelope and outbound contracts emitted by the engine
// ============================================================================

pub mod groups;
pub mod types;

pub use groups::GroupKey;
pub use types::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::ids::{ActorId, TenantId};

/// Envelope carried by every event the engine emits. `data` holds one of the
/// payload shapes in [`types`], keyed by `event_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub event_type: String,
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub tenant_id: TenantId,
    pub data: serde_json::Value,
    pub metadata: EventMetadata,
    pub occurred_at: DateTime<Utc>,
}

/// Context and tracing attached to an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    pub actor_id: Option<ActorId>,
    pub correlation_id: Uuid,
    pub source: String,
}

impl DomainEvent {
    pub fn builder(
        event_type: impl Into<String>,
        aggregate_id: Uuid,
        aggregate_type: impl Into<String>,
        tenant_id: TenantId,
    ) -> DomainEventBuilder {
        DomainEventBuilder {
            event_type: event_type.into(),
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            tenant_id,
            data: serde_json::Value::Null,
            metadata: EventMetadata {
                actor_id: None,
                correlation_id: Uuid::new_v4(),
                source: "engine".to_string(),
            },
        }
    }

    /// Pub/sub topic used by the out-of-process mirror.
    pub fn topic(&self) -> String {
        format!(
            "events.{}.{}",
            self.aggregate_type.to_lowercase(),
            self.event_type
        )
    }

    /// Tenant-scoped topic.
    pub fn tenant_topic(&self) -> String {
        format!("events.tenant.{}.{}", self.tenant_id, self.event_type)
    }

    /// Stream name for replay storage.
    pub fn stream_name(&self) -> String {
        format!("{}-{}", self.aggregate_type.to_lowercase(), self.aggregate_id)
    }
}

pub struct DomainEventBuilder {
    event_type: String,
    aggregate_id: Uuid,
    aggregate_type: String,
    tenant_id: TenantId,
    data: serde_json::Value,
    metadata: EventMetadata,
}

impl DomainEventBuilder {
    pub fn data<T: Serialize>(mut self, data: T) -> Result<Self> {
        self.data = serde_json::to_value(data)?;
        Ok(self)
    }

    pub fn actor(mut self, actor_id: ActorId) -> Self {
        self.metadata.actor_id = Some(actor_id);
        self
    }

    pub fn correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.metadata.correlation_id = correlation_id;
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.metadata.source = source.into();
        self
    }

    pub fn build(self) -> DomainEvent {
        DomainEvent {
            id: Uuid::new_v4(),
            event_type: self.event_type,
            aggregate_id: self.aggregate_id,
            aggregate_type: self.aggregate_type,
            tenant_id: self.tenant_id,
            data: self.data,
            metadata: self.metadata,
            occurred_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_topics() {
        let tenant = TenantId::new();
        let aggregate = Uuid::new_v4();
        let event = DomainEvent::builder(
            inventory_events::STOCK_LEVEL_CHANGED,
            aggregate,
            "InventoryItem",
            tenant,
        )
        .build();

        assert_eq!(event.topic(), "events.inventoryitem.StockLevelChanged");
        assert_eq!(
            event.tenant_topic(),
            format!("events.tenant.{tenant}.StockLevelChanged")
        );
        assert_eq!(event.stream_name(), format!("inventoryitem-{aggregate}"));
    }

    #[test]
    fn test_builder_carries_actor_and_data() {
        let actor = ActorId::new();
        let event = DomainEvent::builder(
            inventory_events::ALERT_RAISED,
            Uuid::new_v4(),
            "Alert",
            TenantId::new(),
        )
        .actor(actor)
        .data(serde_json::json!({"kind": "low_stock"}))
        .unwrap()
        .build();

        assert_eq!(event.metadata.actor_id, Some(actor));
        assert_eq!(event.data["kind"], "low_stock");
    }
}
