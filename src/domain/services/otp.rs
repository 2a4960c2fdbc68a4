//! One-time password policy: code generation, hashing, send rate limiting
//! and verification outcomes.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;

#[derive(Debug, Clone, PartialEq)]
pub struct OtpPolicy {
    pub code_length: usize,
    pub ttl: Duration,
    pub max_verify_attempts: u32,
    pub max_sends_per_window: usize,
    pub window: Duration,
    pub resend_cooldown: Duration,
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self {
            code_length: 6,
            ttl: Duration::minutes(5),
            max_verify_attempts: 5,
            max_sends_per_window: 5,
            window: Duration::minutes(15),
            resend_cooldown: Duration::seconds(60),
        }
    }
}

/// Why a send was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendRefusal {
    Cooldown { retry_after_seconds: u64 },
    WindowExhausted { retry_after_seconds: u64 },
}

impl SendRefusal {
    pub fn retry_after_seconds(&self) -> u64 {
        match self {
            SendRefusal::Cooldown {
                retry_after_seconds,
            }
            | SendRefusal::WindowExhausted {
                retry_after_seconds,
            } => *retry_after_seconds,
        }
    }
}

fn seconds_until(now: DateTime<Utc>, at: DateTime<Utc>) -> u64 {
    (at - now).num_seconds().max(1) as u64
}

/// Decides whether another code may be sent to a destination.
///
/// `recent_sends` holds the creation times of codes sent to the same
/// destination; entries outside the window are ignored.
pub fn check_send_allowed(
    recent_sends: &[DateTime<Utc>],
    now: DateTime<Utc>,
    policy: &OtpPolicy,
) -> Result<(), SendRefusal> {
    let window_start = now - policy.window;
    let mut in_window: Vec<DateTime<Utc>> = recent_sends
        .iter()
        .copied()
        .filter(|t| *t > window_start && *t <= now)
        .collect();
    in_window.sort();

    if in_window.len() >= policy.max_sends_per_window {
        let oldest_counted = in_window[in_window.len() - policy.max_sends_per_window];
        return Err(SendRefusal::WindowExhausted {
            retry_after_seconds: seconds_until(now, oldest_counted + policy.window),
        });
    }

    if let Some(latest) = in_window.last() {
        let cooldown_ends = *latest + policy.resend_cooldown;
        if cooldown_ends > now {
            return Err(SendRefusal::Cooldown {
                retry_after_seconds: seconds_until(now, cooldown_ends),
            });
        }
    }

    Ok(())
}

pub fn generate_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

type HmacSha256 = Hmac<Sha256>;

/// Keyed hash of a code bound to its destination. Only this is stored.
pub fn hash_code(pepper: &[u8], destination: &str, code: &str) -> String {
    let mut mac = match HmacSha256::new_from_slice(pepper) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 accepts any key length"),
    };
    mac.update(destination.as_bytes());
    mac.update(b":");
    mac.update(code.trim().as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Stored state of an issued code, as seen by the verifier.
#[derive(Debug, Clone)]
pub struct IssuedCode {
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
    pub attempts: u32,
    pub consumed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpOutcome {
    Verified,
    Mismatch { remaining_attempts: u32 },
    Expired,
    TooManyAttempts,
    AlreadyUsed,
}

/// Checks a submitted code against the latest issued code.
///
/// `issued.attempts` counts earlier guesses. The caller reserves the guess
/// being checked in storage first.
pub fn verify(
    issued: &IssuedCode,
    submitted_hash: &str,
    now: DateTime<Utc>,
    policy: &OtpPolicy,
) -> OtpOutcome {
    if issued.consumed {
        return OtpOutcome::AlreadyUsed;
    }
    if now >= issued.expires_at {
        return OtpOutcome::Expired;
    }
    if issued.attempts >= policy.max_verify_attempts {
        return OtpOutcome::TooManyAttempts;
    }

    if constant_time_eq(issued.code_hash.as_bytes(), submitted_hash.as_bytes()) {
        OtpOutcome::Verified
    } else {
        OtpOutcome::Mismatch {
            remaining_attempts: policy.max_verify_attempts - issued.attempts - 1,
        }
    }
}

pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
