use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_shared::ids::ActorId;

/// Soft-delete state embedded in aggregates. Destruction never removes
/// rows; it stamps the marker and the record drops out of scoped queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftDeleteMarker {
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<ActorId>,
}

impl SoftDeleteMarker {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn mark(&mut self, actor: ActorId, at: DateTime<Utc>) {
        self.deleted_at = Some(at);
        self.deleted_by = Some(actor);
    }

    pub fn restore(&mut self) {
        self.deleted_at = None;
        self.deleted_by = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_and_restore() {
        let mut marker = SoftDeleteMarker::default();
        assert!(!marker.is_deleted());

        let actor = ActorId::new();
        marker.mark(actor, Utc::now());
        assert!(marker.is_deleted());
        assert_eq!(marker.deleted_by, Some(actor));

        marker.restore();
        assert!(!marker.is_deleted());
        assert_eq!(marker.deleted_by, None);
    }
}
