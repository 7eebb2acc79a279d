//! Fixed-point stock quantity. All ledger math is exact decimal arithmetic
//! with precision 18 and scale 6; floating point never enters the engine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Neg;

use crate::error::{Error, Result};

/// Maximum fractional digits carried by any quantity.
pub const QUANTITY_SCALE: u32 = 6;

/// Maximum total significant digits (integer + fractional).
pub const QUANTITY_PRECISION: u32 = 18;

/// A signed stock quantity expressed in the variant's base unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(Decimal);

impl Quantity {
    pub const ZERO: Quantity = Quantity(Decimal::ZERO);

    /// Validate and normalize a decimal into a quantity. Fails when the
    /// value carries more than 6 fractional digits or overflows 18 total
    /// digits.
    pub fn new(value: Decimal) -> Result<Self> {
        let normalized = value.normalize();
        if normalized.scale() > QUANTITY_SCALE {
            return Err(Error::InvalidQuantity(format!(
                "scale {} exceeds {}",
                normalized.scale(),
                QUANTITY_SCALE
            )));
        }
        if Self::digits(normalized) > QUANTITY_PRECISION {
            return Err(Error::InvalidQuantity(format!(
                "{} exceeds precision {}",
                normalized, QUANTITY_PRECISION
            )));
        }
        Ok(Self(normalized))
    }

    /// Whole-unit convenience constructor.
    pub fn from_units(units: i64) -> Self {
        Self(Decimal::from(units))
    }

    pub fn inner(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    /// Exact addition; overflow beyond the precision bound is an error
    /// rather than a wrap or a rounding.
    pub fn checked_add(&self, other: Quantity) -> Result<Self> {
        let sum = self
            .0
            .checked_add(other.0)
            .ok_or_else(|| Error::InvalidQuantity("quantity addition overflow".into()))?;
        Self::new(sum)
    }

    pub fn checked_sub(&self, other: Quantity) -> Result<Self> {
        let diff = self
            .0
            .checked_sub(other.0)
            .ok_or_else(|| Error::InvalidQuantity("quantity subtraction overflow".into()))?;
        Self::new(diff)
    }

    pub fn checked_mul(&self, factor: Decimal) -> Result<Self> {
        let product = self
            .0
            .checked_mul(factor)
            .ok_or_else(|| Error::InvalidQuantity("quantity multiplication overflow".into()))?;
        Self::new(product.round_dp(QUANTITY_SCALE))
    }

    fn digits(value: Decimal) -> u32 {
        let mantissa = value.mantissa().unsigned_abs();
        if mantissa == 0 {
            return 1;
        }
        let mut digits = 0u32;
        let mut remaining = mantissa;
        while remaining > 0 {
            remaining /= 10;
            digits += 1;
        }
        digits
    }
}

impl Neg for Quantity {
    type Output = Quantity;

    fn neg(self) -> Quantity {
        Quantity(-self.0)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<Decimal> for Quantity {
    type Error = Error;

    fn try_from(value: Decimal) -> Result<Self> {
        Quantity::new(value)
    }
}
