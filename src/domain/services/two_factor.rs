//! TOTP two-factor authentication (RFC 6238: SHA-1, 6 digits, 30s step).

use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use totp_rs::{Algorithm, Secret, TOTP};

use super::otp::constant_time_eq;

const DIGITS: usize = 6;
const SKEW_STEPS: u8 = 1;
const STEP_SECONDS: u64 = 30;
pub const RECOVERY_CODE_COUNT: usize = 8;
const RECOVERY_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

#[derive(Debug, thiserror::Error)]
pub enum TwoFactorError {
    #[error("Invalid TOTP secret: {0}")]
    InvalidSecret(String),

    #[error("QR code generation failed: {0}")]
    QrCode(String),

    #[error("System clock error: {0}")]
    Clock(String),
}

/// Material handed to the user when 2FA setup starts.
#[derive(Debug, Clone, Serialize)]
pub struct TwoFactorSetup {
    pub secret: String,
    pub otpauth_url: String,
    /// PNG encoded as base64
    pub qr_code: String,
}

/// otpauth labels use `:` between issuer and account, so neither may contain one.
fn label_part(raw: &str) -> String {
    raw.replace(':', "_")
}

fn build_totp(secret_base32: &str, issuer: &str, account: &str) -> Result<TOTP, TwoFactorError> {
    let bytes = Secret::Encoded(secret_base32.to_string())
        .to_bytes()
        .map_err(|e| TwoFactorError::InvalidSecret(format!("{:?}", e)))?;

    TOTP::new(
        Algorithm::SHA1,
        DIGITS,
        SKEW_STEPS,
        STEP_SECONDS,
        bytes,
        Some(label_part(issuer)),
        label_part(account),
    )
    .map_err(|e| TwoFactorError::InvalidSecret(e.to_string()))
}

pub fn generate_setup(issuer: &str, account: &str) -> Result<TwoFactorSetup, TwoFactorError> {
    let secret = Secret::generate_secret().to_encoded().to_string();
    let totp = build_totp(&secret, issuer, account)?;

    let qr_code = totp.get_qr_base64().map_err(TwoFactorError::QrCode)?;

    Ok(TwoFactorSetup {
        secret: totp.get_secret_base32(),
        otpauth_url: totp.get_url(),
        qr_code,
    })
}

fn looks_like_totp(code: &str) -> bool {
    code.len() == DIGITS && code.bytes().all(|b| b.is_ascii_digit())
}

fn now_unix() -> Result<u64, TwoFactorError> {
    u64::try_from(chrono::Utc::now().timestamp())
        .map_err(|e| TwoFactorError::Clock(e.to_string()))
}

/// Time step whose code matches, searching one step either side of `unix_time`.
///
/// Callers record the step and refuse any later code at or below it, so a
/// code is accepted at most once.
pub fn matching_step_at(
    secret_base32: &str,
    issuer: &str,
    account: &str,
    code: &str,
    unix_time: u64,
) -> Result<Option<u64>, TwoFactorError> {
    let code = code.trim();
    if !looks_like_totp(code) {
        return Ok(None);
    }
    let totp = build_totp(secret_base32, issuer, account)?;
    let current = unix_time / STEP_SECONDS;
    let first = current.saturating_sub(u64::from(SKEW_STEPS));
    let last = current + u64::from(SKEW_STEPS);

    Ok((first..=last).find(|step| {
        let expected = totp.generate(step * STEP_SECONDS);
        constant_time_eq(expected.as_bytes(), code.as_bytes())
    }))
}

pub fn matching_step(
    secret_base32: &str,
    issuer: &str,
    account: &str,
    code: &str,
) -> Result<Option<u64>, TwoFactorError> {
    matching_step_at(secret_base32, issuer, account, code, now_unix()?)
}

/// Stateless check. Logins go through [`matching_step`] so the step can be
/// recorded and the code refused a second time.
pub fn verify_code(
    secret_base32: &str,
    issuer: &str,
    account: &str,
    code: &str,
) -> Result<bool, TwoFactorError> {
    Ok(matching_step(secret_base32, issuer, account, code)?.is_some())
}

/// Verification against an explicit unix time.
pub fn verify_code_at(
    secret_base32: &str,
    issuer: &str,
    account: &str,
    code: &str,
    unix_time: u64,
) -> Result<bool, TwoFactorError> {
    Ok(matching_step_at(secret_base32, issuer, account, code, unix_time)?.is_some())
}

pub fn code_at(
    secret_base32: &str,
    issuer: &str,
    account: &str,
    unix_time: u64,
) -> Result<String, TwoFactorError> {
    Ok(build_totp(secret_base32, issuer, account)?.generate(unix_time))
}

/// Fresh single-use recovery codes formatted `XXXX-XXXX`.
pub fn generate_recovery_codes() -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..RECOVERY_CODE_COUNT)
        .map(|_| {
            let raw: String = (0..8)
                .map(|_| RECOVERY_ALPHABET[rng.gen_range(0..RECOVERY_ALPHABET.len())] as char)
                .collect();
            format!("{}-{}", &raw[..4], &raw[4..])
        })
        .collect()
}

pub fn hash_recovery_code(code: &str) -> String {
    let normalized: String = code
        .trim()
        .chars()
        .filter(|c| *c != '-' && *c != ' ')
        .map(|c| c.to_ascii_uppercase())
        .collect();
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

pub fn is_recovery_code_format(code: &str) -> bool {
    let compact: Vec<char> = code.trim().chars().filter(|c| *c != '-').collect();
    compact.len() == 8 && compact.iter().all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISSUER: &str = "Tradeport";
    const ACCOUNT: &str = "trader@example.com";

    #[test]
    fn test_setup_produces_usable_secret() {
        let setup = generate_setup(ISSUER, ACCOUNT).unwrap();
        assert!(setup.otpauth_url.starts_with("otpauth://totp/"));
        assert!(setup.otpauth_url.contains("issuer=Tradeport"));
        assert!(!setup.qr_code.is_empty());

        let now = 1_790_000_000;
        let code = code_at(&setup.secret, ISSUER, ACCOUNT, now).unwrap();
        assert!(verify_code_at(&setup.secret, ISSUER, ACCOUNT, &code, now).unwrap());
    }

    #[test]
    fn test_code_accepted_within_skew() {
        let setup = generate_setup(ISSUER, ACCOUNT).unwrap();
        let now = 1_790_000_010;
        let code = code_at(&setup.secret, ISSUER, ACCOUNT, now).unwrap();

        assert!(verify_code_at(&setup.secret, ISSUER, ACCOUNT, &code, now + 30).unwrap());
        assert!(!verify_code_at(&setup.secret, ISSUER, ACCOUNT, &code, now + 300).unwrap());
    }

    #[test]
    fn test_rejects_malformed_codes() {
        let setup = generate_setup(ISSUER, ACCOUNT).unwrap();
        assert!(matching_step(&setup.secret, ISSUER, ACCOUNT, "12345").unwrap().is_none());
        assert!(matching_step(&setup.secret, ISSUER, ACCOUNT, "abcdef").unwrap().is_none());
    }

    #[test]
    fn test_invalid_secret_is_error() {
        assert!(matching_step("not base32!", ISSUER, ACCOUNT, "123456").is_err());
        assert!(verify_code("not base32!", ISSUER, ACCOUNT, "123456").is_err());
    }

    #[test]
    fn test_matching_step_reports_the_step_used() {
        let setup = generate_setup(ISSUER, ACCOUNT).unwrap();
        let now = 1_790_000_010;
        let step = now / STEP_SECONDS;

        let current = code_at(&setup.secret, ISSUER, ACCOUNT, now).unwrap();
        let next = code_at(&setup.secret, ISSUER, ACCOUNT, now + 30).unwrap();
        assert_eq!(
            matching_step_at(&setup.secret, ISSUER, ACCOUNT, &current, now).unwrap(),
            Some(step)
        );
        assert_eq!(
            matching_step_at(&setup.secret, ISSUER, ACCOUNT, &next, now).unwrap(),
            Some(step + 1)
        );
        assert_eq!(
            matching_step_at(&setup.secret, ISSUER, ACCOUNT, "abc", now).unwrap(),
            None
        );
    }

    #[test]
    fn test_account_with_colon_can_enrol() {
        let account = "a:b@example.com";
        let setup = generate_setup("Trade:port", account).unwrap();
        assert!(setup.otpauth_url.starts_with("otpauth://totp/"));

        let now = 1_790_000_000;
        let code = code_at(&setup.secret, "Trade:port", account, now).unwrap();
        assert!(verify_code_at(&setup.secret, "Trade:port", account, &code, now).unwrap());
    }

    #[test]
    fn test_recovery_codes() {
        let codes = generate_recovery_codes();
        assert_eq!(codes.len(), RECOVERY_CODE_COUNT);
        for code in &codes {
            assert_eq!(code.len(), 9);
            assert!(is_recovery_code_format(code));
        }
        assert_eq!(
            hash_recovery_code("abcd-efgh"),
            hash_recovery_code("ABCDEFGH")
        );
    }
}
