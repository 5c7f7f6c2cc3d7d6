use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Major-unit amount. Storage always uses `i64` cents; this is the bridge to
/// `Decimal` arithmetic and two-decimal rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(Decimal);

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Money(Decimal::new(cents, 2))
    }

    /// Kept at full precision until `to_cents`.
    pub fn from_decimal(decimal: Decimal) -> Self {
        Money(decimal)
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }

    /// Rounds half away from zero to the nearest cent. `None` when out of `i64` range.
    pub fn to_cents(self) -> Option<i64> {
        self.0
            .checked_mul(Decimal::ONE_HUNDRED)?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cents_round_trip() {
        assert_eq!(Money::from_cents(-4200).to_cents(), Some(-4200));
        assert_eq!(Money::from_cents(1).to_cents(), Some(1));
    }

    #[test]
    fn display_has_two_decimals() {
        assert_eq!(Money::from_cents(-4200).to_string(), "-42.00");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
    }

    #[test]
    fn to_cents_rounds_half_away_from_zero() {
        assert_eq!(Money::from_decimal(Decimal::new(12345, 3)).to_cents(), Some(1235)); // 12.345
        assert_eq!(Money::from_decimal(Decimal::new(-12345, 3)).to_cents(), Some(-1235));
        assert_eq!(Money::from_decimal(Decimal::new(12344, 3)).to_cents(), Some(1234));
    }

    #[test]
    fn out_of_range_is_none() {
        assert_eq!(Money::from_decimal(Decimal::MAX).to_cents(), None);
    }
}
