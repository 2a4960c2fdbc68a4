//! Phone and email ownership checks under `/api/verify`.
//!
//! Codes are sent through the configured [`OtpSender`] and stored only as an
//! HMAC bound to the destination. Sends are rate limited per destination;
//! each code allows a fixed number of guesses. Both limits are enforced by
//! single conditional statements in [`OtpRepository`].
//!
//! [`OtpSender`]: crate::domain::repositories::notifier::OtpSender
//! [`OtpRepository`]: crate::persistence::otp_repository::OtpRepository

use axum::{extract::State, Extension, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::current_user;
use crate::application::extract::ApiJson;
use crate::application::state::AppState;
use crate::auth::AuthUser;
use crate::domain::entities::otp::OtpPurpose;
use crate::domain::errors::{ApiError, ProviderError};
use crate::domain::repositories::notifier::OtpMessage;
use crate::domain::services::otp::{
    check_send_allowed, generate_code, hash_code, verify, IssuedCode, OtpOutcome, OtpPolicy,
};
use crate::domain::value_objects::email::Email;
use crate::domain::value_objects::phone_number::PhoneNumber;
use crate::persistence::models::{CreateOtpAttempt, OtpAttemptRecord};
use crate::persistence::DatabaseError;

#[derive(Debug, Deserialize)]
pub struct PhoneRequest {
    pub phone: String,
}

#[derive(Debug, Deserialize)]
pub struct PhoneConfirmRequest {
    pub phone: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct FirebaseRequest {
    pub id_token: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailConfirmRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct CodeSentResponse {
    pub sent: bool,
    pub channel: &'static str,
    pub destination: String,
    pub expires_in_seconds: i64,
    pub resend_after_seconds: i64,
}

#[derive(Debug, Serialize)]
pub struct PhoneVerifiedResponse {
    pub phone_verified: bool,
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct EmailVerifiedResponse {
    pub email_verified: bool,
    pub email: String,
}

async fn issue_code(
    state: &AppState,
    user_id: &str,
    purpose: OtpPurpose,
    destination: &str,
    masked_destination: String,
) -> Result<CodeSentResponse, ApiError> {
    let policy = &state.config.otp;
    let now = Utc::now();

    let code = generate_code(policy.code_length);
    let channel = purpose.channel();
    let issued = state
        .otps
        .issue(
            CreateOtpAttempt {
                user_id: Some(user_id.to_string()),
                destination: destination.to_string(),
                channel: channel.as_str().to_string(),
                purpose: purpose.as_str().to_string(),
                code_hash: hash_code(&state.otp_pepper, destination, &code),
                expires_at: now + policy.ttl,
            },
            now,
            policy,
        )
        .await?;

    if issued.is_none() {
        let recent = state
            .otps
            .send_times_since(destination, purpose.as_str(), now - policy.window)
            .await?;
        let retry_after_seconds = match check_send_allowed(&recent, now, policy) {
            Err(refusal) => {
                warn!("OTP send to {} refused: {:?}", masked_destination, refusal);
                refusal.retry_after_seconds()
            }
            Ok(()) => {
                warn!("OTP send to {} refused", masked_destination);
                1
            }
        };
        return Err(ApiError::RateLimitExceeded {
            retry_after_seconds,
        });
    }

    state
        .providers
        .otp_sender
        .send(&OtpMessage {
            channel,
            destination: destination.to_string(),
            code,
            purpose,
            ttl_minutes: policy.ttl.num_minutes(),
        })
        .await?;

    info!(
        "Sent {} code to {} for user {}",
        purpose.as_str(),
        masked_destination,
        user_id
    );

    Ok(CodeSentResponse {
        sent: true,
        channel: channel.as_str(),
        destination: masked_destination,
        expires_in_seconds: policy.ttl.num_seconds(),
        resend_after_seconds: policy.resend_cooldown.num_seconds(),
    })
}

fn issued_code(record: &OtpAttemptRecord, attempts: u32) -> IssuedCode {
    IssuedCode {
        code_hash: record.code_hash.clone(),
        expires_at: record.expires_at,
        attempts,
        consumed: record.consumed_at.is_some(),
    }
}

fn rejection(outcome: OtpOutcome, record_id: i64, policy: &OtpPolicy) -> ApiError {
    match outcome {
        OtpOutcome::Mismatch { remaining_attempts } => ApiError::Unauthorized(format!(
            "Incorrect code, {} attempts remaining",
            remaining_attempts
        )),
        OtpOutcome::Expired => {
            ApiError::InvalidRequest("Code has expired, request a new one".to_string())
        }
        OtpOutcome::TooManyAttempts => {
            warn!("OTP {} locked after too many attempts", record_id);
            ApiError::RateLimitExceeded {
                retry_after_seconds: policy.resend_cooldown.num_seconds().max(1) as u64,
            }
        }
        OtpOutcome::AlreadyUsed | OtpOutcome::Verified => {
            ApiError::InvalidRequest("Code has already been used".to_string())
        }
    }
}

/// Checks `code` against the latest code issued to `destination` by this user.
///
/// A guess is counted before the code is compared, so parallel guesses each
/// spend one of the allowed attempts.
async fn confirm_code(
    state: &AppState,
    user_id: &str,
    purpose: OtpPurpose,
    destination: &str,
    code: &str,
) -> Result<(), ApiError> {
    let policy = &state.config.otp;
    let now = Utc::now();

    let record = state
        .otps
        .latest(destination, purpose.as_str())
        .await?
        .filter(|r| r.user_id.as_deref() == Some(user_id))
        .ok_or_else(|| {
            ApiError::InvalidRequest("No verification code was requested".to_string())
        })?;

    let Some(attempts) = state
        .otps
        .reserve_attempt(record.id, policy.max_verify_attempts, now)
        .await?
    else {
        // Used, expired or out of guesses; report which
        let current = state.otps.get(record.id).await?.unwrap_or(record);
        let stored_attempts = u32::try_from(current.attempts).unwrap_or(u32::MAX);
        let outcome = match verify(&issued_code(&current, stored_attempts), "", now, policy) {
            OtpOutcome::Mismatch { .. } | OtpOutcome::Verified => OtpOutcome::TooManyAttempts,
            other => other,
        };
        return Err(rejection(outcome, current.id, policy));
    };

    let submitted = hash_code(&state.otp_pepper, destination, code);
    let issued = issued_code(&record, attempts.saturating_sub(1));
    match verify(&issued, &submitted, now, policy) {
        OtpOutcome::Verified => {
            if state.otps.consume(record.id).await? {
                Ok(())
            } else {
                Err(rejection(OtpOutcome::AlreadyUsed, record.id, policy))
            }
        }
        other => Err(rejection(other, record.id, policy)),
    }
}

/// Rejects a phone number already verified by a different account.
async fn ensure_phone_available(
    state: &AppState,
    user_id: &str,
    phone: &PhoneNumber,
) -> Result<(), ApiError> {
    match state.users.find_by_phone(phone.e164()).await? {
        Some(owner) if owner.id != user_id => Err(ApiError::Conflict(
            "Phone number is registered to another account".to_string(),
        )),
        _ => Ok(()),
    }
}

async fn store_verified_phone(
    state: &AppState,
    user_id: &str,
    phone: &PhoneNumber,
) -> Result<PhoneVerifiedResponse, ApiError> {
    state
        .users
        .set_phone_verified(user_id, phone.e164())
        .await
        .map_err(|e| match e {
            DatabaseError::Duplicate(_) => ApiError::Conflict(
                "Phone number is registered to another account".to_string(),
            ),
            other => other.into(),
        })?;

    info!("✓ Phone {} verified for user {}", phone.masked(), user_id);
    Ok(PhoneVerifiedResponse {
        phone_verified: true,
        phone: phone.e164().to_string(),
    })
}

pub async fn request_phone_code(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    ApiJson(body): ApiJson<PhoneRequest>,
) -> Result<Json<CodeSentResponse>, ApiError> {
    let phone = PhoneNumber::parse(&body.phone)?;
    ensure_phone_available(&state, &auth.user_id, &phone).await?;

    let response = issue_code(
        &state,
        &auth.user_id,
        OtpPurpose::PhoneVerification,
        phone.e164(),
        phone.masked(),
    )
    .await?;
    Ok(Json(response))
}

pub async fn confirm_phone(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    ApiJson(body): ApiJson<PhoneConfirmRequest>,
) -> Result<Json<PhoneVerifiedResponse>, ApiError> {
    let phone = PhoneNumber::parse(&body.phone)?;
    confirm_code(
        &state,
        &auth.user_id,
        OtpPurpose::PhoneVerification,
        phone.e164(),
        &body.code,
    )
    .await?;

    ensure_phone_available(&state, &auth.user_id, &phone).await?;
    Ok(Json(store_verified_phone(&state, &auth.user_id, &phone).await?))
}

pub async fn confirm_phone_firebase(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    ApiJson(body): ApiJson<FirebaseRequest>,
) -> Result<Json<PhoneVerifiedResponse>, ApiError> {
    let verifier = state.providers.phone_auth.as_ref().ok_or_else(|| {
        ProviderError::NotConfigured("Firebase phone verification is disabled".to_string())
    })?;

    let verified = verifier.verify_id_token(&body.id_token).await?;
    let phone = PhoneNumber::parse(&verified.phone_number)?;

    ensure_phone_available(&state, &auth.user_id, &phone).await?;
    Ok(Json(store_verified_phone(&state, &auth.user_id, &phone).await?))
}

pub async fn request_email_code(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<CodeSentResponse>, ApiError> {
    let user = current_user(&state, &auth).await?;
    if user.email_verified {
        return Err(ApiError::Conflict("Email is already verified".to_string()));
    }
    let email = Email::parse(&user.email)?;

    let response = issue_code(
        &state,
        &user.id,
        OtpPurpose::EmailVerification,
        email.as_str(),
        email.masked(),
    )
    .await?;
    Ok(Json(response))
}

pub async fn confirm_email(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    ApiJson(body): ApiJson<EmailConfirmRequest>,
) -> Result<Json<EmailVerifiedResponse>, ApiError> {
    let user = current_user(&state, &auth).await?;
    if user.email_verified {
        return Err(ApiError::Conflict("Email is already verified".to_string()));
    }

    confirm_code(
        &state,
        &user.id,
        OtpPurpose::EmailVerification,
        &user.email,
        &body.code,
    )
    .await?;
    state.users.set_email_verified(&user.id).await?;

    info!("✓ Email verified for user {}", user.id);
    Ok(Json(EmailVerifiedResponse {
        email_verified: true,
        email: user.email,
    }))
}
