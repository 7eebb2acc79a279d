//! Tagged identifier newtypes. Two IDs of different entity kinds never
//! compare equal even when the underlying bytes match, because they are
//! distinct types.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{Error, Result};

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Mint a fresh identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID, rejecting the nil value.
            pub fn from_uuid(value: Uuid) -> Result<Self> {
                if value.is_nil() {
                    return Err(Error::Validation(format!(
                        "{} must not be nil",
                        stringify!($name)
                    )));
                }
                Ok(Self(value))
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

define_id!(
    /// Top-level data partition; every read and write is scoped to one.
    TenantId
);
define_id!(
    /// User or system principal performing a command.
    ActorId
);
define_id!(ProductId);
define_id!(VariantId);
define_id!(WarehouseId);
define_id!(InventoryItemId);
define_id!(MovementId);
define_id!(ReservationId);
define_id!(AlertId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nil_rejected() {
        assert!(TenantId::from_uuid(Uuid::nil()).is_err());
        assert!(VariantId::from_uuid(Uuid::new_v4()).is_ok());
    }

    #[test]
    fn test_round_trips_through_serde() {
        let id = WarehouseId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: WarehouseId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
