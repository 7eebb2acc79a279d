use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

const SKU_MIN_LEN: usize = 3;
const SKU_MAX_LEN: usize = 50;

/// Immutable public identifier of a variant. Normalized to uppercase at
/// creation; unique per tenant (uniqueness is enforced by the store).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sku(String);

impl Sku {
    /// Parse a raw SKU: trims surrounding whitespace, uppercases, then
    /// validates length (3-50) and charset (A-Z, 0-9, `-`, `_`).
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_ascii_uppercase();

        if normalized.len() < SKU_MIN_LEN || normalized.len() > SKU_MAX_LEN {
            return Err(Error::Validation(format!(
                "SKU length must be {}-{} characters, got {}",
                SKU_MIN_LEN,
                SKU_MAX_LEN,
                normalized.len()
            )));
        }

        if !normalized
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            return Err(Error::Validation(format!(
                "SKU may only contain uppercase alphanumerics, '-' and '_': {normalized}"
            )));
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("widget-001", "WIDGET-001")]
    #[case("  ab_9  ", "AB_9")]
    #[case("SKU", "SKU")]
    fn test_parse_normalizes(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(Sku::parse(raw).unwrap().as_str(), expected);
    }

    #[rstest]
    #[case("ab")]
    #[case("")]
    #[case("has space")]
    #[case("emoji-🚀")]
    fn test_parse_rejects(#[case] raw: &str) {
        assert!(Sku::parse(raw).is_err());
    }

    #[test]
    fn test_max_length_boundary() {
        let at_limit = "A".repeat(50);
        let over_limit = "A".repeat(51);
        assert!(Sku::parse(&at_limit).is_ok());
        assert!(Sku::parse(&over_limit).is_err());
    }
}
