use bigdecimal::{BigDecimal, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

use crate::domain::errors::ValidationError;

/// Amount in satang (1/100 THB).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_satang(satang: i64) -> Result<Self, ValidationError> {
        if satang < 0 {
            return Err(ValidationError::MustBeNonNegative);
        }
        Ok(Money(satang))
    }

    pub fn from_baht(baht: f64) -> Result<Self, ValidationError> {
        if !baht.is_finite() {
            return Err(ValidationError::MustBeFinite);
        }
        if baht < 0.0 {
            return Err(ValidationError::MustBeNonNegative);
        }
        let satang = (baht * 100.0).round();
        if satang > i64::MAX as f64 {
            return Err(ValidationError::InvalidAmount("amount too large".to_string()));
        }
        Ok(Money(satang as i64))
    }

    pub fn satang(&self) -> i64 {
        self.0
    }

    pub fn to_baht(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Saturates at zero.
    pub fn saturating_sub(&self, other: Money) -> Money {
        Money((self.0 - other.0).max(0))
    }

    /// Multiplies by a non-negative decimal rate, rounding down to whole satang.
    ///
    /// The product is exact, so a rate of `0.29` on 100 satang yields 29.
    pub fn scale_floor(&self, rate: &BigDecimal) -> Money {
        if *rate <= BigDecimal::zero() {
            return Money::ZERO;
        }
        // Both factors are non-negative, so truncation is the floor
        let scaled = (BigDecimal::from(self.0) * rate).with_scale(0);
        Money(scaled.to_i64().unwrap_or(i64::MAX))
    }

    /// Two-decimal string used in PromptPay payloads, e.g. `150.50`.
    pub fn format_decimal(&self) -> String {
        format!("{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} THB", self.format_decimal())
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        Money(iter.map(|m| m.0).sum())
    }
}
