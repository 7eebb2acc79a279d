//! Units of measure. Ledger math always runs in the variant's immutable base
//! unit; conversions are display metadata and never touch stored quantities.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitCategory {
    Count,
    Weight,
    Volume,
    Length,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "unit_of_measure", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UnitOfMeasure {
    Each,
    Dozen,
    Case,
    Gram,
    Kilogram,
    Tonne,
    Millilitre,
    Litre,
    Millimetre,
    Metre,
}

impl UnitOfMeasure {
    pub fn category(&self) -> UnitCategory {
        match self {
            UnitOfMeasure::Each | UnitOfMeasure::Dozen | UnitOfMeasure::Case => UnitCategory::Count,
            UnitOfMeasure::Gram | UnitOfMeasure::Kilogram | UnitOfMeasure::Tonne => {
                UnitCategory::Weight
            }
            UnitOfMeasure::Millilitre | UnitOfMeasure::Litre => UnitCategory::Volume,
            UnitOfMeasure::Millimetre | UnitOfMeasure::Metre => UnitCategory::Length,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            UnitOfMeasure::Each => "ea",
            UnitOfMeasure::Dozen => "dz",
            UnitOfMeasure::Case => "cs",
            UnitOfMeasure::Gram => "g",
            UnitOfMeasure::Kilogram => "kg",
            UnitOfMeasure::Tonne => "t",
            UnitOfMeasure::Millilitre => "ml",
            UnitOfMeasure::Litre => "l",
            UnitOfMeasure::Millimetre => "mm",
            UnitOfMeasure::Metre => "m",
        }
    }
}

impl fmt::Display for UnitOfMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A directed conversion entry attached to a variant. Factor must be
/// strictly positive and both units must share a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitConversion {
    pub from: UnitOfMeasure,
    pub to: UnitOfMeasure,
    pub factor: Decimal,
}

impl UnitConversion {
    pub fn new(from: UnitOfMeasure, to: UnitOfMeasure, factor: Decimal) -> Result<Self> {
        if factor <= Decimal::ZERO {
            return Err(Error::InvalidUnit(format!(
                "conversion factor must be positive, got {factor}"
            )));
        }
        if from.category() != to.category() {
            return Err(Error::InvalidUnit(format!(
                "cannot convert across unit categories: {from} -> {to}"
            )));
        }
        if from == to {
            return Err(Error::InvalidUnit(format!(
                "conversion from {from} to itself is redundant"
            )));
        }
        Ok(Self { from, to, factor })
    }
}

/// Conversion entries owned by a variant, looked up by (from, to).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionTable {
    entries: Vec<UnitConversion>,
}

impl ConversionTable {
    pub fn new(entries: Vec<UnitConversion>) -> Self {
        Self { entries }
    }

    pub fn add(&mut self, conversion: UnitConversion) {
        self.entries
            .retain(|c| !(c.from == conversion.from && c.to == conversion.to));
        self.entries.push(conversion);
    }

    /// Factor for converting a display amount in `from` into `to`. Direct
    /// entries win; the reverse entry is used at its reciprocal.
    pub fn factor(&self, from: UnitOfMeasure, to: UnitOfMeasure) -> Result<Decimal> {
        if from == to {
            return Ok(Decimal::ONE);
        }
        if let Some(c) = self.entries.iter().find(|c| c.from == from && c.to == to) {
            return Ok(c.factor);
        }
        if let Some(c) = self.entries.iter().find(|c| c.from == to && c.to == from) {
            return Decimal::ONE
                .checked_div(c.factor)
                .ok_or_else(|| Error::InvalidUnit(format!("degenerate factor {}", c.factor)));
        }
        Err(Error::UnitConversionNotFound {
            from: from.code().to_string(),
            to: to.code().to_string(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_cross_category_rejected() {
        let err = UnitConversion::new(UnitOfMeasure::Each, UnitOfMeasure::Kilogram, dec!(12));
        assert!(err.is_err());
    }

    #[test]
    fn test_non_positive_factor_rejected() {
        assert!(UnitConversion::new(UnitOfMeasure::Dozen, UnitOfMeasure::Each, dec!(0)).is_err());
        assert!(UnitConversion::new(UnitOfMeasure::Dozen, UnitOfMeasure::Each, dec!(-1)).is_err());
    }

    #[test]
    fn test_lookup_direct_and_reverse() {
        let mut table = ConversionTable::default();
        table.add(UnitConversion::new(UnitOfMeasure::Dozen, UnitOfMeasure::Each, dec!(12)).unwrap());

        assert_eq!(
            table.factor(UnitOfMeasure::Dozen, UnitOfMeasure::Each).unwrap(),
            dec!(12)
        );
        assert_eq!(
            table.factor(UnitOfMeasure::Each, UnitOfMeasure::Dozen).unwrap(),
            Decimal::ONE / dec!(12)
        );
        assert!(table
            .factor(UnitOfMeasure::Each, UnitOfMeasure::Case)
            .is_err());
    }
}
