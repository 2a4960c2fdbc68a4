use chrono::Duration;
use std::str::FromStr;

use crate::domain::services::affiliate::AffiliatePolicy;
use crate::domain::services::otp::OtpPolicy;
use crate::domain::services::withdrawal_policy::WithdrawalPolicy;
use crate::domain::value_objects::money::Money;
use crate::rate_limit::RateLimiterConfig;

/// Service configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub jwt_ttl_seconds: i64,
    pub challenge_ttl_seconds: i64,
    pub otp: OtpPolicy,
    pub affiliate: AffiliatePolicy,
    pub withdrawal: WithdrawalPolicy,
    pub rate_limits: RateLimiterConfig,
    /// Base URL of the trading-signal service (e.g. `http://127.0.0.1:8000/`)
    pub signal_service_url: String,
    pub signal_timeout_seconds: u64,
    /// Forward-test sync period; 0 disables the background sync
    pub signal_sync_interval_seconds: u64,
    pub totp_issuer: String,
    /// Shown in SMS and email bodies
    pub brand_name: String,
    pub sms_gateway_url: Option<String>,
    pub sms_sender: String,
    pub email_gateway_url: Option<String>,
    pub email_from: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            jwt_ttl_seconds: 24 * 3600,
            challenge_ttl_seconds: 300,
            otp: OtpPolicy::default(),
            affiliate: AffiliatePolicy::default(),
            withdrawal: WithdrawalPolicy::default(),
            rate_limits: RateLimiterConfig::default(),
            signal_service_url: "http://127.0.0.1:8000/".to_string(),
            signal_timeout_seconds: 10,
            signal_sync_interval_seconds: 300,
            totp_issuer: "Tradeport".to_string(),
            brand_name: "Tradeport".to_string(),
            sms_gateway_url: None,
            sms_sender: "TRADEPORT".to_string(),
            email_gateway_url: None,
            email_from: "no-reply@tradeport.local".to_string(),
        }
    }
}

/// Reads `name`, keeping `default` when unset, unparseable or rejected by `valid`.
fn env_or<T>(name: &str, default: T, valid: impl Fn(&T) -> bool) -> T
where
    T: FromStr + std::fmt::Debug,
    T::Err: std::fmt::Display,
{
    let Ok(raw) = std::env::var(name) else {
        return default;
    };

    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => value,
        Ok(value) => {
            tracing::warn!(
                "Invalid {} value: {:?} (out of range), using default: {:?}",
                name,
                value,
                default
            );
            default
        }
        Err(e) => {
            tracing::warn!(
                "Failed to parse {} '{}': {}, using default: {:?}",
                name,
                raw,
                e,
                default
            );
            default
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppConfig {
        let mut config = AppConfig::default();

        if let Some(addr) = env_string("BIND_ADDR") {
            config.bind_addr = addr;
        }

        config.jwt_ttl_seconds = env_or("JWT_TTL_SECONDS", config.jwt_ttl_seconds, |v| {
            (300..=30 * 24 * 3600).contains(v)
        });
        config.challenge_ttl_seconds = env_or(
            "TWO_FACTOR_CHALLENGE_TTL_SECONDS",
            config.challenge_ttl_seconds,
            |v| (60..=1800).contains(v),
        );

        // OTP policy
        let otp_ttl = env_or("OTP_TTL_SECONDS", config.otp.ttl.num_seconds(), |v| {
            (60..=3600).contains(v)
        });
        config.otp.ttl = Duration::seconds(otp_ttl);
        config.otp.max_verify_attempts =
            env_or("OTP_MAX_VERIFY_ATTEMPTS", config.otp.max_verify_attempts, |v| {
                (1..=20).contains(v)
            });
        config.otp.max_sends_per_window =
            env_or("OTP_MAX_SENDS_PER_WINDOW", config.otp.max_sends_per_window, |v| {
                (1..=50).contains(v)
            });
        let window = env_or("OTP_WINDOW_SECONDS", config.otp.window.num_seconds(), |v| {
            (60..=24 * 3600).contains(v)
        });
        config.otp.window = Duration::seconds(window);
        let cooldown = env_or(
            "OTP_RESEND_COOLDOWN_SECONDS",
            config.otp.resend_cooldown.num_seconds(),
            |v| (0..=600).contains(v),
        );
        config.otp.resend_cooldown = Duration::seconds(cooldown);

        // Affiliate policy, validated as a whole below
        let mut affiliate = config.affiliate.clone();
        affiliate.base_rate = env_or("AFFILIATE_BASE_RATE", affiliate.base_rate, |v| {
            v.is_finite()
        });
        affiliate.decay = env_or("AFFILIATE_DECAY", affiliate.decay, |v| v.is_finite());
        affiliate.max_levels = env_or("AFFILIATE_MAX_LEVELS", affiliate.max_levels, |v| {
            (1..=20).contains(v)
        });
        let min_payout = env_or(
            "AFFILIATE_MIN_PAYOUT_SATANG",
            affiliate.min_payout.satang(),
            |v| *v >= 1,
        );
        affiliate.min_payout = Money::from_satang(min_payout).unwrap_or(affiliate.min_payout);
        match affiliate.validate() {
            Ok(()) => config.affiliate = affiliate,
            Err(e) => tracing::warn!("Invalid affiliate policy ({}), using defaults", e),
        }

        // Withdrawal limits in satang
        let min_amount = env_or(
            "WITHDRAWAL_MIN_SATANG",
            config.withdrawal.min_amount.satang(),
            |v| *v > 0,
        );
        let max_amount = env_or(
            "WITHDRAWAL_MAX_SATANG",
            config.withdrawal.max_amount.satang(),
            |v| *v > 0,
        );
        if min_amount <= max_amount {
            if let (Ok(min), Ok(max)) = (Money::from_satang(min_amount), Money::from_satang(max_amount)) {
                config.withdrawal.min_amount = min;
                config.withdrawal.max_amount = max;
            }
        } else {
            tracing::warn!(
                "WITHDRAWAL_MIN_SATANG {} exceeds WITHDRAWAL_MAX_SATANG {}, using defaults",
                min_amount,
                max_amount
            );
        }

        config.rate_limits.requests_per_minute = env_or(
            "RATE_LIMIT_PER_MINUTE",
            config.rate_limits.requests_per_minute,
            |v| (1..=100_000).contains(v),
        );
        config.rate_limits.auth_requests_per_minute = env_or(
            "AUTH_RATE_LIMIT_PER_MINUTE",
            config.rate_limits.auth_requests_per_minute,
            |v| (1..=1000).contains(v),
        );

        if let Some(url) = env_string("SIGNAL_SERVICE_URL") {
            match url::Url::parse(&url) {
                Ok(_) => config.signal_service_url = url,
                Err(e) => tracing::warn!(
                    "Invalid SIGNAL_SERVICE_URL '{}': {}, using default: {}",
                    url,
                    e,
                    config.signal_service_url
                ),
            }
        }
        config.signal_timeout_seconds = env_or(
            "SIGNAL_TIMEOUT_SECONDS",
            config.signal_timeout_seconds,
            |v| (1..=120).contains(v),
        );
        config.signal_sync_interval_seconds = env_or(
            "SIGNAL_SYNC_INTERVAL_SECONDS",
            config.signal_sync_interval_seconds,
            |v| *v == 0 || (30..=86_400).contains(v),
        );

        if let Some(issuer) = env_string("TOTP_ISSUER") {
            config.totp_issuer = issuer;
        }
        if let Some(brand) = env_string("BRAND_NAME") {
            config.brand_name = brand;
        }
        config.sms_gateway_url = env_string("SMS_GATEWAY_URL");
        if let Some(sender) = env_string("SMS_SENDER") {
            config.sms_sender = sender;
        }
        config.email_gateway_url = env_string("EMAIL_GATEWAY_URL");
        if let Some(from) = env_string("EMAIL_FROM") {
            config.email_from = from;
        }

        config
    }
}
