//! Whole-unit CDR amounts.
//!
//! Issuance arithmetic must be reproduced bit-for-bit by every node, so the
//! amount type is deliberately narrow: nonnegative integers with floor
//! division by small scalars, plus a two-step ratio multiply (`ration` then
//! `product`) that widens to 256 bits internally so `⌊a·b/c⌋` never loses
//! precision to an intermediate overflow or truncation.
//!
//! Underflow and zero divisors are programmer errors, not runtime
//! conditions: those operations panic.

use primitive_types::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::CinderError;

/// A nonnegative CDR amount.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn new(units: u64) -> Self {
        Amount(units as u128)
    }

    pub fn value(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// 1 if positive, 0 if zero. Amounts are never negative.
    pub fn sign(&self) -> u8 {
        if self.0 > 0 {
            1
        } else {
            0
        }
    }

    pub fn add(self, other: Amount) -> Amount {
        Amount(self.0.checked_add(other.0).expect("amount overflow"))
    }

    /// # Panics
    /// Panics if the result would be negative.
    pub fn sub(self, other: Amount) -> Amount {
        match self.0.checked_sub(other.0) {
            Some(v) => Amount(v),
            None => panic!("amount underflow: {} - {}", self, other),
        }
    }

    pub fn mul(self, scalar: u64) -> Amount {
        Amount(
            self.0
                .checked_mul(scalar as u128)
                .expect("amount overflow"),
        )
    }

    /// Floor division by a small positive scalar.
    ///
    /// # Panics
    /// Panics if `scalar` is zero.
    pub fn div(self, scalar: u64) -> Amount {
        if scalar == 0 {
            panic!("amount division by zero");
        }
        Amount(self.0 / scalar as u128)
    }

    /// Begin a ratio multiply: `self / denominator`, kept exact until
    /// [`Ration::product`] applies it to a base amount.
    ///
    /// # Panics
    /// Panics if `denominator` is zero.
    pub fn ration(self, denominator: Amount) -> Ration {
        if denominator.is_zero() {
            panic!("ration with zero denominator");
        }
        Ration {
            numerator: self.0,
            denominator: denominator.0,
        }
    }
}

/// An exact rational `numerator / denominator` awaiting its base.
#[derive(Clone, Copy, Debug)]
pub struct Ration {
    numerator: u128,
    denominator: u128,
}

impl Ration {
    /// `⌊numerator · base / denominator⌋`, computed through 256-bit
    /// intermediates so the product never overflows.
    pub fn product(&self, base: Amount) -> Amount {
        let wide = U256::from(self.numerator) * U256::from(base.0) / U256::from(self.denominator);
        Amount(wide.as_u128())
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Amount({})", self.0)
    }
}

impl FromStr for Amount {
    type Err = CinderError;

    /// Parse a decimal string. A fractional part is accepted only if it is
    /// all zeros: CDR issuance is whole-unit.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (s, None),
        };
        if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CinderError::InvalidAmount(s.to_string()));
        }
        if let Some(frac) = frac_part {
            if frac.is_empty() || !frac.bytes().all(|b| b == b'0') {
                return Err(CinderError::InvalidAmount(s.to_string()));
            }
        }
        let value: u128 = int_part
            .parse()
            .map_err(|_| CinderError::InvalidAmount(s.to_string()))?;
        Ok(Amount(value))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_basics() {
        let a = Amount::new(500_000);
        assert_eq!(a.div(10), Amount::new(50_000));
        assert_eq!(a.div(10).div(365), Amount::new(136));
        assert_eq!(Amount::new(136).mul(3), Amount::new(408));
        assert_eq!(a.sub(Amount::new(136)), Amount::new(499_864));
        assert_eq!(Amount::ZERO.sign(), 0);
        assert_eq!(a.sign(), 1);
    }

    #[test]
    fn ration_product_is_exact() {
        // (200 / 700) · 700 must floor to exactly 200, not 199.
        let share = Amount::new(200).ration(Amount::new(700)).product(Amount::new(700));
        assert_eq!(share, Amount::new(200));

        // A ratio that cannot divide evenly floors.
        let share = Amount::new(1).ration(Amount::new(3)).product(Amount::new(100));
        assert_eq!(share, Amount::new(33));
    }

    #[test]
    fn ration_product_survives_wide_intermediates() {
        let huge = Amount(u128::MAX / 2);
        let half = huge.ration(huge).product(huge);
        assert_eq!(half, huge);
    }

    #[test]
    #[should_panic(expected = "amount underflow")]
    fn sub_underflow_panics() {
        let _ = Amount::new(1).sub(Amount::new(2));
    }

    #[test]
    #[should_panic(expected = "division by zero")]
    fn div_by_zero_panics() {
        let _ = Amount::new(1).div(0);
    }

    #[test]
    #[should_panic(expected = "zero denominator")]
    fn ration_zero_denominator_panics() {
        let _ = Amount::new(1).ration(Amount::ZERO);
    }

    #[test]
    fn string_codec() {
        assert_eq!("10000".parse::<Amount>().unwrap(), Amount::new(10_000));
        assert_eq!("10000.00".parse::<Amount>().unwrap(), Amount::new(10_000));
        assert!("10000.5".parse::<Amount>().is_err());
        assert!("".parse::<Amount>().is_err());
        assert!("-3".parse::<Amount>().is_err());
        assert_eq!(Amount::new(42).to_string(), "42");

        let json = serde_json::to_string(&Amount::new(10_000)).unwrap();
        assert_eq!(json, "\"10000\"");
        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Amount::new(10_000));
    }
}
