use thiserror::Error;

use crate::domain::entities::withdrawal::WithdrawalStatus;
use crate::domain::value_objects::money::Money;

#[derive(Debug, Clone, PartialEq)]
pub struct WithdrawalPolicy {
    pub min_amount: Money,
    pub max_amount: Money,
}

impl Default for WithdrawalPolicy {
    fn default() -> Self {
        Self {
            min_amount: Money::from_satang(10_000).unwrap_or_default(),
            max_amount: Money::from_satang(5_000_000).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum WithdrawalRejection {
    #[error("Amount {amount} is below the minimum of {minimum}")]
    BelowMinimum { amount: Money, minimum: Money },

    #[error("Amount {amount} exceeds the per-request maximum of {maximum}")]
    AboveMaximum { amount: Money, maximum: Money },

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Money, available: Money },

    #[error("A withdrawal request is already pending")]
    PendingRequestExists,

    #[error("Phone number must be verified before withdrawing")]
    PhoneNotVerified,

    #[error("Cannot move withdrawal from {from} to {to}")]
    InvalidTransition {
        from: WithdrawalStatus,
        to: WithdrawalStatus,
    },
}

/// Facts about the requesting user needed to accept a withdrawal.
#[derive(Debug, Clone)]
pub struct WithdrawalContext {
    pub available_balance: Money,
    pub has_open_request: bool,
    pub phone_verified: bool,
}

pub fn validate_request(
    amount: Money,
    ctx: &WithdrawalContext,
    policy: &WithdrawalPolicy,
) -> Result<(), WithdrawalRejection> {
    if !ctx.phone_verified {
        return Err(WithdrawalRejection::PhoneNotVerified);
    }
    if ctx.has_open_request {
        return Err(WithdrawalRejection::PendingRequestExists);
    }
    if amount < policy.min_amount {
        return Err(WithdrawalRejection::BelowMinimum {
            amount,
            minimum: policy.min_amount,
        });
    }
    if amount > policy.max_amount {
        return Err(WithdrawalRejection::AboveMaximum {
            amount,
            maximum: policy.max_amount,
        });
    }
    if amount > ctx.available_balance {
        return Err(WithdrawalRejection::InsufficientBalance {
            requested: amount,
            available: ctx.available_balance,
        });
    }
    Ok(())
}

pub fn check_transition(
    from: WithdrawalStatus,
    to: WithdrawalStatus,
) -> Result<(), WithdrawalRejection> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(WithdrawalRejection::InvalidTransition { from, to })
    }
}
