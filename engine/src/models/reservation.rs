use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_shared::error::{Error, Result};
use stockbook_shared::events::ReservationStatus;
use stockbook_shared::ids::{ActorId, ReservationId, TenantId, VariantId, WarehouseId};
use stockbook_shared::quantity::Quantity;

const REFERENCE_MAX_LEN: usize = 100;

/// A claim against available stock. Reservations reduce availability
/// without moving stock; the matching Sale movement is issued separately
/// by the caller at fulfillment time.
///
/// State machine:
/// `Active -> {PartiallyFulfilled, Fulfilled, Cancelled, Expired}`,
/// `PartiallyFulfilled -> {Fulfilled, Cancelled, Expired}`;
/// `Fulfilled`, `Cancelled` and `Expired` are terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub tenant_id: TenantId,
    pub variant_id: VariantId,
    pub warehouse_id: WarehouseId,
    pub original_quantity: Quantity,
    pub current_quantity: Quantity,
    pub fulfilled_quantity: Quantity,
    pub expires_at_utc: DateTime<Utc>,
    pub status: ReservationStatus,
    pub reference_number: String,
    pub notes: Option<String>,
    pub created_by: ActorId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Reservation {
    pub fn create(
        tenant_id: TenantId,
        variant_id: VariantId,
        warehouse_id: WarehouseId,
        quantity: Quantity,
        expires_at_utc: DateTime<Utc>,
        reference_number: String,
        notes: Option<String>,
        created_by: ActorId,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if !quantity.is_positive() {
            return Err(Error::InvalidQuantity(
                "reservation quantity must be positive".into(),
            ));
        }
        if expires_at_utc <= now {
            return Err(Error::Validation(
                "reservation expiry must be in the future".into(),
            ));
        }
        let reference_number = reference_number.trim().to_string();
        if reference_number.is_empty() || reference_number.len() > REFERENCE_MAX_LEN {
            return Err(Error::Validation(format!(
                "reference number must be 1-{REFERENCE_MAX_LEN} characters"
            )));
        }
        Ok(Self {
            id: ReservationId::new(),
            tenant_id,
            variant_id,
            warehouse_id,
            original_quantity: quantity,
            current_quantity: quantity,
            fulfilled_quantity: Quantity::ZERO,
            expires_at_utc,
            status: ReservationStatus::Active,
            reference_number,
            notes,
            created_by,
            created_at: now,
            updated_at: now,
            closed_at: None,
        })
    }

    /// Quantity still held against available stock.
    pub fn outstanding(&self) -> Quantity {
        if self.status.is_terminal() {
            return Quantity::ZERO;
        }
        self.current_quantity
            .checked_sub(self.fulfilled_quantity)
            .unwrap_or(Quantity::ZERO)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && self.expires_at_utc <= now
    }

    fn ensure_open(&self) -> Result<()> {
        match self.status {
            ReservationStatus::Active | ReservationStatus::PartiallyFulfilled => Ok(()),
            ReservationStatus::Expired => Err(Error::ReservationExpired),
            _ => Err(Error::ReservationAlreadyUsed),
        }
    }

    /// Change the reserved quantity. Returns the signed delta against the
    /// previous `current_quantity`; the caller applies it to the item's
    /// reserved counter.
    pub fn modify_quantity(&mut self, new_quantity: Quantity, now: DateTime<Utc>) -> Result<Quantity> {
        self.ensure_open()?;
        if !new_quantity.is_positive() {
            return Err(Error::InvalidQuantity(
                "reservation quantity must stay positive".into(),
            ));
        }
        if new_quantity < self.fulfilled_quantity {
            return Err(Error::InvalidQuantity(format!(
                "cannot shrink below fulfilled quantity {}",
                self.fulfilled_quantity
            )));
        }
        let delta = new_quantity.checked_sub(self.current_quantity)?;
        self.current_quantity = new_quantity;
        self.updated_at = now;
        Ok(delta)
    }

    pub fn extend_expiry(&mut self, new_expiry: DateTime<Utc>, now: DateTime<Utc>) -> Result<()> {
        self.ensure_open()?;
        if new_expiry <= now {
            return Err(Error::Validation("new expiry must be in the future".into()));
        }
        if new_expiry <= self.expires_at_utc {
            return Err(Error::Validation(
                "new expiry must extend the current expiry".into(),
            ));
        }
        self.expires_at_utc = new_expiry;
        self.updated_at = now;
        Ok(())
    }

    /// Record fulfillment of a slice. Returns the quantity released from
    /// the item's reserved counter (equal to `quantity`).
    pub fn fulfill(&mut self, quantity: Quantity, now: DateTime<Utc>) -> Result<Quantity> {
        self.ensure_open()?;
        if !quantity.is_positive() {
            return Err(Error::InvalidQuantity(
                "fulfillment quantity must be positive".into(),
            ));
        }
        if quantity > self.outstanding() {
            return Err(Error::InvalidQuantity(format!(
                "fulfillment {} exceeds outstanding {}",
                quantity,
                self.outstanding()
            )));
        }
        self.fulfilled_quantity = self.fulfilled_quantity.checked_add(quantity)?;
        self.updated_at = now;
        if self.fulfilled_quantity == self.current_quantity {
            self.status = ReservationStatus::Fulfilled;
            self.closed_at = Some(now);
        } else {
            self.status = ReservationStatus::PartiallyFulfilled;
        }
        Ok(quantity)
    }

    /// Cancel the remainder. Returns the quantity released from the item's
    /// reserved counter.
    pub fn cancel(&mut self, reason: Option<String>, now: DateTime<Utc>) -> Result<Quantity> {
        self.ensure_open()?;
        let released = self.outstanding();
        self.status = ReservationStatus::Cancelled;
        if let Some(reason) = reason {
            self.notes = Some(match self.notes.take() {
                Some(existing) => format!("{existing}; cancelled: {reason}"),
                None => format!("cancelled: {reason}"),
            });
        }
        self.updated_at = now;
        self.closed_at = Some(now);
        Ok(released)
    }

    /// Expire an overdue reservation. Only valid once `expires_at_utc` has
    /// passed; returns the released quantity.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Result<Quantity> {
        self.ensure_open()?;
        if now < self.expires_at_utc {
            return Err(Error::Validation(
                "reservation has not reached its expiry".into(),
            ));
        }
        let released = self.outstanding();
        self.status = ReservationStatus::Expired;
        self.updated_at = now;
        self.closed_at = Some(now);
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reservation(quantity: i64) -> Reservation {
        Reservation::create(
            TenantId::new(),
            VariantId::new(),
            WarehouseId::new(),
            Quantity::from_units(quantity),
            Utc::now() + chrono::Duration::days(7),
            "ORDER-123".into(),
            None,
            ActorId::new(),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_create_validations() {
        let now = Utc::now();
        assert!(Reservation::create(
            TenantId::new(),
            VariantId::new(),
            WarehouseId::new(),
            Quantity::ZERO,
            now + chrono::Duration::days(1),
            "REF".into(),
            None,
            ActorId::new(),
            now,
        )
        .is_err());

        // expiry exactly at now fails; a millisecond later succeeds
        assert!(Reservation::create(
            TenantId::new(),
            VariantId::new(),
            WarehouseId::new(),
            Quantity::from_units(1),
            now,
            "REF".into(),
            None,
            ActorId::new(),
            now,
        )
        .is_err());
        assert!(Reservation::create(
            TenantId::new(),
            VariantId::new(),
            WarehouseId::new(),
            Quantity::from_units(1),
            now + chrono::Duration::milliseconds(1),
            "REF".into(),
            None,
            ActorId::new(),
            now,
        )
        .is_ok());

        assert!(Reservation::create(
            TenantId::new(),
            VariantId::new(),
            WarehouseId::new(),
            Quantity::from_units(1),
            now + chrono::Duration::days(1),
            "   ".into(),
            None,
            ActorId::new(),
            now,
        )
        .is_err());
    }

    #[test]
    fn test_partial_then_full_fulfillment() {
        let mut r = reservation(100);
        let released = r.fulfill(Quantity::from_units(30), Utc::now()).unwrap();
        assert_eq!(released, Quantity::from_units(30));
        assert_eq!(r.status, ReservationStatus::PartiallyFulfilled);
        assert_eq!(r.outstanding(), Quantity::from_units(70));

        r.fulfill(Quantity::from_units(70), Utc::now()).unwrap();
        assert_eq!(r.status, ReservationStatus::Fulfilled);
        assert_eq!(r.outstanding(), Quantity::ZERO);

        let err = r.fulfill(Quantity::from_units(1), Utc::now()).unwrap_err();
        assert_eq!(err.code(), "RESERVATION_ALREADY_USED");
    }

    #[test]
    fn test_modify_respects_fulfilled_floor() {
        let mut r = reservation(100);
        r.fulfill(Quantity::from_units(40), Utc::now()).unwrap();

        assert!(r.modify_quantity(Quantity::from_units(30), Utc::now()).is_err());
        let delta = r
            .modify_quantity(Quantity::from_units(150), Utc::now())
            .unwrap();
        assert_eq!(delta, Quantity::from_units(50));
        assert_eq!(r.outstanding(), Quantity::from_units(110));
    }

    #[test]
    fn test_extend_must_move_forward() {
        let mut r = reservation(10);
        let now = Utc::now();
        assert!(r.extend_expiry(r.expires_at_utc, now).is_err());
        assert!(r
            .extend_expiry(r.expires_at_utc + chrono::Duration::days(1), now)
            .is_ok());
    }

    #[test]
    fn test_cancel_releases_outstanding_only() {
        let mut r = reservation(100);
        r.fulfill(Quantity::from_units(25), Utc::now()).unwrap();
        let released = r.cancel(Some("customer backed out".into()), Utc::now()).unwrap();
        assert_eq!(released, Quantity::from_units(75));
        assert_eq!(r.status, ReservationStatus::Cancelled);
        assert!(r.notes.as_deref().unwrap().contains("customer backed out"));
    }

    #[test]
    fn test_expire_requires_due_time() {
        let mut r = reservation(10);
        assert!(r.expire(Utc::now()).is_err());

        r.expires_at_utc = Utc::now() - chrono::Duration::seconds(1);
        let released = r.expire(Utc::now()).unwrap();
        assert_eq!(released, Quantity::from_units(10));
        assert_eq!(r.status, ReservationStatus::Expired);

        // terminal: a second expire reports the expired state
        assert_eq!(
            r.expire(Utc::now()).unwrap_err().code(),
            "RESERVATION_EXPIRED"
        );
    }
}
