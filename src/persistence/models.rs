//! Database Models
//!
//! Rows as stored, plus the inputs used to create them. Money columns are
//! integer satang.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// User account row
#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub phone_verified: bool,
    pub email_verified: bool,
    pub referral_code: String,
    pub referrer_id: Option<String>,
    pub two_factor_secret: Option<String>,
    pub two_factor_enabled: bool,
    /// Newest TOTP time step accepted; codes at or below it are refused
    pub two_factor_last_step: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateUser {
    pub email: String,
    pub password_hash: String,
    pub display_name: Option<String>,
    pub referral_code: String,
    pub referrer_id: Option<String>,
}

/// Issued one-time code
#[derive(Debug, Clone, FromRow)]
pub struct OtpAttemptRecord {
    pub id: i64,
    pub user_id: Option<String>,
    pub destination: String,
    pub channel: String,
    pub purpose: String,
    pub code_hash: String,
    pub attempts: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CreateOtpAttempt {
    pub user_id: Option<String>,
    pub destination: String,
    pub channel: String,
    pub purpose: String,
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
}

/// Known device of a user
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeviceRecord {
    pub id: String,
    pub user_id: String,
    pub fingerprint: String,
    pub label: String,
    pub last_ip: Option<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// Commission paid to one upline member for one sale
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CommissionRecord {
    pub id: String,
    pub source_ref: String,
    pub beneficiary_id: String,
    pub buyer_id: String,
    pub level: i64,
    pub sale_amount: i64,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

/// Direct referral as shown to the referrer
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReferralRecord {
    pub id: String,
    pub display_name: Option<String>,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct WithdrawalRecord {
    pub id: String,
    pub user_id: String,
    pub amount: i64,
    pub method: String,
    pub bank_code: Option<String>,
    pub account_number: Option<String>,
    pub account_name: String,
    pub promptpay_id: Option<String>,
    pub status: String,
    pub reject_reason: Option<String>,
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CreateWithdrawal {
    pub user_id: String,
    pub amount: i64,
    pub method: String,
    pub bank_code: Option<String>,
    pub account_number: Option<String>,
    pub account_name: String,
    pub promptpay_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ForwardTestRecord {
    pub sequence_id: String,
    pub symbol: String,
    pub timeframe: String,
    pub model_version: String,
    pub side: String,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub pnl_percent: Option<f64>,
    pub status: String,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}
