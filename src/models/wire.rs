use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::fmt;

/// A decimal rendered the way the exchange expects on the wire: no trailing
/// zeros and no trailing decimal point (`"1.5"`, `"10"`, `"0"`).
///
/// Only constructible from a [`Decimal`], so every value that reaches the
/// gateway has gone through [`canonical_decimal`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WireDecimal(String);

impl WireDecimal {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value. The string always came from a `Decimal`, so it parses.
    pub fn to_decimal(&self) -> Decimal {
        self.0.parse().unwrap_or_default()
    }
}

impl From<Decimal> for WireDecimal {
    fn from(value: Decimal) -> Self {
        WireDecimal(canonical_decimal(value))
    }
}

impl fmt::Display for WireDecimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for WireDecimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Strip trailing zeros (and a dangling point) from a decimal's string form.
pub fn canonical_decimal(value: Decimal) -> String {
    let normalized = value.normalize();
    if normalized.is_zero() {
        // normalize() keeps the sign of negative zero
        return "0".to_string();
    }
    normalized.to_string()
}
