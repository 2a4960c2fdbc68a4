//! Affiliate commission calculator.
//!
//! A sale made by a user pays commission to every referrer above them (the
//! upline), nearest referrer first. Level `k` (1-based) is paid
//! `amount * base_rate * decay^(k-1)`, rounded down to whole satang.

use bigdecimal::{BigDecimal, One, Zero};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

use crate::domain::value_objects::money::Money;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffiliatePolicy {
    /// Share of the sale paid to the direct referrer
    pub base_rate: f64,
    /// Multiplier applied per level above the direct referrer
    pub decay: f64,
    /// Deepest upline level that receives commission
    pub max_levels: usize,
    /// Shares smaller than this are not paid
    pub min_payout: Money,
}

impl Default for AffiliatePolicy {
    fn default() -> Self {
        Self {
            base_rate: 0.10,
            decay: 0.5,
            max_levels: 5,
            min_payout: Money::from_satang(1).unwrap_or_default(),
        }
    }
}

impl AffiliatePolicy {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.base_rate > 0.0 && self.base_rate <= 0.5) {
            return Err(format!(
                "base_rate must be in (0, 0.5], got {}",
                self.base_rate
            ));
        }
        if !(self.decay > 0.0 && self.decay <= 1.0) {
            return Err(format!("decay must be in (0, 1], got {}", self.decay));
        }
        if self.max_levels == 0 || self.max_levels > 20 {
            return Err(format!(
                "max_levels must be between 1 and 20, got {}",
                self.max_levels
            ));
        }
        let total_rate = self.total_rate(self.max_levels);
        if total_rate > 1.0 {
            return Err(format!(
                "policy would pay out {:.1}% of a sale",
                total_rate * 100.0
            ));
        }
        Ok(())
    }

    /// Exact rate paid at a 1-based level, before rounding.
    ///
    /// Rates are taken at their shortest decimal form (`0.29`, not the
    /// nearest binary fraction) so flooring matches decimal arithmetic.
    pub fn rate_at(&self, level: usize) -> BigDecimal {
        if level == 0 || level > self.max_levels {
            return BigDecimal::zero();
        }
        let (Some(base), Some(decay)) = (as_decimal(self.base_rate), as_decimal(self.decay)) else {
            return BigDecimal::zero();
        };

        let mut factor = BigDecimal::one();
        for _ in 1..level {
            factor = factor * &decay;
        }
        base * factor
    }

    /// Sum of rates over the first `levels` levels (geometric series).
    pub fn total_rate(&self, levels: usize) -> f64 {
        let n = levels.min(self.max_levels) as i32;
        if (self.decay - 1.0).abs() < f64::EPSILON {
            self.base_rate * n as f64
        } else {
            self.base_rate * (1.0 - self.decay.powi(n)) / (1.0 - self.decay)
        }
    }
}

fn as_decimal(value: f64) -> Option<BigDecimal> {
    BigDecimal::from_str(&value.to_string()).ok()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionShare {
    pub beneficiary_id: String,
    pub level: u32,
    pub amount: Money,
}

/// Computes the commission owed to each upline member for a sale.
///
/// `upline` is ordered nearest referrer first. The walk stops at the first
/// repeated user id, at `max_levels`, or at the first share below
/// `min_payout`.
pub fn calculate_commissions(
    sale_amount: Money,
    upline: &[String],
    policy: &AffiliatePolicy,
) -> Vec<CommissionShare> {
    let mut seen = HashSet::new();
    let mut shares = Vec::new();

    for (index, user_id) in upline.iter().take(policy.max_levels).enumerate() {
        if !seen.insert(user_id.as_str()) {
            break;
        }

        let level = index + 1;
        let amount = sale_amount.scale_floor(&policy.rate_at(level));
        if amount < policy.min_payout || amount == Money::ZERO {
            break;
        }

        shares.push(CommissionShare {
            beneficiary_id: user_id.clone(),
            level: level as u32,
            amount,
        });
    }

    shares
}

pub fn total_payout(shares: &[CommissionShare]) -> Money {
    shares.iter().map(|s| s.amount).sum()
}

/// Unrounded payout for an upline of `levels` members.
pub fn expected_total(sale_amount: Money, levels: usize, policy: &AffiliatePolicy) -> f64 {
    sale_amount.satang() as f64 * policy.total_rate(levels)
}

pub const REFERRAL_CODE_LENGTH: usize = 8;
// No 0/O or 1/I, so codes survive being read aloud
const REFERRAL_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub fn generate_referral_code() -> String {
    let mut rng = rand::thread_rng();
    (0..REFERRAL_CODE_LENGTH)
        .map(|_| REFERRAL_ALPHABET[rng.gen_range(0..REFERRAL_ALPHABET.len())] as char)
        .collect()
}

/// Canonical form of a code typed by a user.
pub fn normalize_referral_code(raw: &str) -> Option<String> {
    let code = raw.trim().to_uppercase();
    let valid = code.len() == REFERRAL_CODE_LENGTH
        && code.bytes().all(|b| REFERRAL_ALPHABET.contains(&b));
    valid.then_some(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upline(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("user-{}", i)).collect()
    }

    fn baht(v: f64) -> Money {
        Money::from_baht(v).unwrap()
    }

    #[test]
    fn test_default_policy_is_valid() {
        assert!(AffiliatePolicy::default().validate().is_ok());
    }

    #[test]
    fn test_payout_decays_per_level() {
        let shares = calculate_commissions(baht(1000.0), &upline(5), &AffiliatePolicy::default());

        let amounts: Vec<i64> = shares.iter().map(|s| s.amount.satang()).collect();
        assert_eq!(amounts, vec![10_000, 5_000, 2_500, 1_250, 625]);
        assert_eq!(shares[0].beneficiary_id, "user-1");
        assert_eq!(shares[4].level, 5);
    }

    #[test]
    fn test_total_matches_decayed_sum() {
        let policy = AffiliatePolicy::default();
        let shares = calculate_commissions(baht(1000.0), &upline(5), &policy);

        assert_eq!(total_payout(&shares), baht(193.75));
        assert!((expected_total(baht(1000.0), 5, &policy) - 19_375.0).abs() < 1e-6);
    }

    #[test]
    fn test_total_never_exceeds_unrounded_expectation() {
        let policy = AffiliatePolicy {
            base_rate: 0.07,
            decay: 0.6,
            max_levels: 8,
            min_payout: Money::from_satang(1).unwrap(),
        };
        let sale = Money::from_satang(123_457).unwrap();
        let shares = calculate_commissions(sale, &upline(8), &policy);
        let total = total_payout(&shares).satang() as f64;
        let expected = expected_total(sale, 8, &policy);

        assert!(total <= expected);
        // Floor rounding loses less than one satang per level
        assert!(expected - total < shares.len() as f64);
    }

    #[test]
    fn test_floor_uses_decimal_rates() {
        let policy = AffiliatePolicy {
            base_rate: 0.29,
            decay: 0.7,
            max_levels: 3,
            min_payout: Money::from_satang(1).unwrap(),
        };
        assert!(policy.validate().is_ok());

        // 100 * 0.29 = 29, 100 * 0.203 = 20.3, 100 * 0.1421 = 14.21
        let shares = calculate_commissions(Money::from_satang(100).unwrap(), &upline(3), &policy);
        let amounts: Vec<i64> = shares.iter().map(|s| s.amount.satang()).collect();
        assert_eq!(amounts, vec![29, 20, 14]);
    }

    #[test]
    fn test_rate_at_is_exact() {
        let policy = AffiliatePolicy::default();
        assert_eq!(policy.rate_at(1), BigDecimal::from_str("0.1").unwrap());
        assert_eq!(policy.rate_at(3), BigDecimal::from_str("0.025").unwrap());
        assert_eq!(policy.rate_at(6), BigDecimal::zero());
    }

    #[test]
    fn test_short_upline_pays_only_existing_levels() {
        let shares = calculate_commissions(baht(1000.0), &upline(2), &AffiliatePolicy::default());
        assert_eq!(shares.len(), 2);
        assert_eq!(total_payout(&shares), baht(150.0));
    }

    #[test]
    fn test_levels_beyond_max_are_ignored() {
        let shares = calculate_commissions(baht(1000.0), &upline(12), &AffiliatePolicy::default());
        assert_eq!(shares.len(), 5);
    }

    #[test]
    fn test_empty_upline_pays_nothing() {
        let shares = calculate_commissions(baht(1000.0), &[], &AffiliatePolicy::default());
        assert!(shares.is_empty());
    }

    #[test]
    fn test_small_sale_stops_below_min_payout() {
        let policy = AffiliatePolicy {
            min_payout: Money::from_satang(100).unwrap(),
            ..AffiliatePolicy::default()
        };
        // 50 THB: 500, 250, 125, 62 satang
        let shares = calculate_commissions(baht(50.0), &upline(5), &policy);
        assert_eq!(shares.len(), 3);
    }

    #[test]
    fn test_cycle_in_upline_stops_walk() {
        let chain = vec![
            "a".to_string(),
            "b".to_string(),
            "a".to_string(),
            "c".to_string(),
        ];
        let shares = calculate_commissions(baht(1000.0), &chain, &AffiliatePolicy::default());
        assert_eq!(shares.len(), 2);
    }

    #[test]
    fn test_policy_validation_rejects_overpaying() {
        let policy = AffiliatePolicy {
            base_rate: 0.5,
            decay: 1.0,
            max_levels: 3,
            ..AffiliatePolicy::default()
        };
        assert!(policy.validate().is_err());

        let policy = AffiliatePolicy {
            decay: 0.0,
            ..AffiliatePolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_referral_codes() {
        let code = generate_referral_code();
        assert_eq!(code.len(), REFERRAL_CODE_LENGTH);
        assert_eq!(normalize_referral_code(&code.to_lowercase()), Some(code));
        assert_eq!(normalize_referral_code("SHORT"), None);
        assert_eq!(normalize_referral_code("ABCDEFG0"), None);
    }
}
