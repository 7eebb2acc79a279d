//! Movement metadata. A constrained JSON-like value (scalars, arrays,
//! nested maps) rather than an open `serde_json::Value`, with typed
//! constructors for the shapes the engine itself writes.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ids::WarehouseId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Decimal(Decimal),
    Text(String),
    Array(Vec<MetadataValue>),
    Map(BTreeMap<String, MetadataValue>),
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

/// Key/value bag attached to a stock movement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovementMetadata(BTreeMap<String, MetadataValue>);

impl MovementMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata recorded on both legs of a transfer.
    pub fn for_transfer(source: WarehouseId, destination: WarehouseId) -> Self {
        let mut map = BTreeMap::new();
        map.insert(
            "source_warehouse".to_string(),
            MetadataValue::Text(source.to_string()),
        );
        map.insert(
            "destination_warehouse".to_string(),
            MetadataValue::Text(destination.to_string()),
        );
        Self(map)
    }

    /// Metadata recorded on a sale movement.
    pub fn for_sale(order_reference: &str) -> Self {
        let mut map = BTreeMap::new();
        map.insert("order_reference".to_string(), order_reference.into());
        Self(map)
    }

    /// Metadata recorded on a refund, pointing back at the original sale.
    pub fn for_refund(original_sale_reference: &str) -> Self {
        let mut map = BTreeMap::new();
        map.insert(
            "original_sale_reference".to_string(),
            original_sale_reference.into(),
        );
        Self(map)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MetadataValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn merged_with(mut self, other: MovementMetadata) -> Self {
        self.0.extend(other.0);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_shape() {
        let source = WarehouseId::new();
        let dest = WarehouseId::new();
        let meta = MovementMetadata::for_transfer(source, dest);

        assert_eq!(
            meta.get("source_warehouse"),
            Some(&MetadataValue::Text(source.to_string()))
        );
        assert_eq!(
            meta.get("destination_warehouse"),
            Some(&MetadataValue::Text(dest.to_string()))
        );
    }

    #[test]
    fn test_serializes_as_plain_json_object() {
        let mut meta = MovementMetadata::new();
        meta.insert("count", 3i64);
        meta.insert("damaged", true);

        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json, serde_json::json!({"count": 3, "damaged": true}));
    }

    #[test]
    fn test_nested_values_round_trip() {
        let mut inner = BTreeMap::new();
        inner.insert("po".to_string(), MetadataValue::Text("PO-1".into()));
        let mut meta = MovementMetadata::new();
        meta.insert("lines", MetadataValue::Array(vec![MetadataValue::Map(inner)]));

        let json = serde_json::to_string(&meta).unwrap();
        let back: MovementMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(meta, back);
    }
}
