//! TOTP enrolment under `/api/auth/2fa`.

use axum::{extract::State, Extension, Json};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::current_user;
use crate::application::extract::ApiJson;
use crate::application::state::AppState;
use crate::auth::{verify_password, AuthUser};
use crate::domain::errors::ApiError;
use crate::domain::services::two_factor::{
    generate_recovery_codes, generate_setup, hash_recovery_code, is_recovery_code_format,
    matching_step, TwoFactorSetup,
};
use crate::persistence::models::UserRecord;

#[derive(Debug, Deserialize)]
pub struct EnableRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct DisableRequest {
    pub password: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct EnableResponse {
    pub enabled: bool,
    /// Shown once; only hashes are kept
    pub recovery_codes: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TwoFactorStatusResponse {
    pub enabled: bool,
    pub pending_setup: bool,
    pub recovery_codes_remaining: i64,
}

/// Checks a TOTP code, falling back to a single-use recovery code.
///
/// A TOTP code is accepted once: its time step must be newer than the last
/// one accepted for the user. Returns false for accounts without an active
/// 2FA secret.
pub(crate) async fn verify_second_factor(
    state: &AppState,
    user: &UserRecord,
    code: &str,
) -> Result<bool, ApiError> {
    let Some(secret) = user.two_factor_secret.as_deref() else {
        return Ok(false);
    };
    if !user.two_factor_enabled {
        return Ok(false);
    }

    if let Some(step) = matching_step(secret, &state.config.totp_issuer, &user.email, code)? {
        let fresh = state.users.advance_totp_step(&user.id, step_value(step)?).await?;
        if !fresh {
            warn!("Replayed authentication code for user {}", user.id);
        }
        return Ok(fresh);
    }

    if is_recovery_code_format(code) {
        let used = state
            .users
            .consume_recovery_code(&user.id, &hash_recovery_code(code))
            .await?;
        if used {
            info!("User {} authenticated with a recovery code", user.id);
        }
        return Ok(used);
    }

    Ok(false)
}

fn step_value(step: u64) -> Result<i64, ApiError> {
    i64::try_from(step)
        .map_err(|_| ApiError::InternalServerError("TOTP step out of range".to_string()))
}

pub async fn setup(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<TwoFactorSetup>, ApiError> {
    let user = current_user(&state, &auth).await?;
    if user.two_factor_enabled {
        return Err(ApiError::Forbidden(
            "Two-factor authentication is already enabled".to_string(),
        ));
    }

    let setup = generate_setup(&state.config.totp_issuer, &user.email)?;
    state
        .users
        .set_pending_two_factor(&user.id, &setup.secret)
        .await?;

    info!("Started two-factor setup for user {}", user.id);
    Ok(Json(setup))
}

pub async fn enable(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    ApiJson(body): ApiJson<EnableRequest>,
) -> Result<Json<EnableResponse>, ApiError> {
    let user = current_user(&state, &auth).await?;
    if user.two_factor_enabled {
        return Err(ApiError::Forbidden(
            "Two-factor authentication is already enabled".to_string(),
        ));
    }
    let secret = user.two_factor_secret.as_deref().ok_or_else(|| {
        ApiError::InvalidRequest("No pending two-factor setup; call setup first".to_string())
    })?;

    let Some(step) = matching_step(secret, &state.config.totp_issuer, &user.email, &body.code)?
    else {
        warn!("Invalid code while enabling two-factor for user {}", user.id);
        return Err(ApiError::Unauthorized(
            "Invalid authentication code".to_string(),
        ));
    };

    let recovery_codes = generate_recovery_codes();
    let hashes: Vec<String> = recovery_codes.iter().map(|c| hash_recovery_code(c)).collect();
    let enabled = state
        .users
        .enable_two_factor(&user.id, secret, step_value(step)?, &hashes)
        .await?;
    if !enabled {
        warn!("Two-factor setup for user {} changed while enabling", user.id);
        return Err(ApiError::Conflict(
            "Two-factor setup is no longer pending".to_string(),
        ));
    }

    info!("✓ Two-factor enabled for user {}", user.id);
    Ok(Json(EnableResponse {
        enabled: true,
        recovery_codes,
    }))
}

pub async fn disable(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    ApiJson(body): ApiJson<DisableRequest>,
) -> Result<Json<TwoFactorStatusResponse>, ApiError> {
    let user = current_user(&state, &auth).await?;
    if !user.two_factor_enabled {
        return Err(ApiError::Forbidden(
            "Two-factor authentication is not enabled".to_string(),
        ));
    }

    if !verify_password(&body.password, &user.password_hash) {
        warn!("Wrong password while disabling two-factor for user {}", user.id);
        return Err(ApiError::Unauthorized("Invalid password".to_string()));
    }
    if !verify_second_factor(&state, &user, &body.code).await? {
        warn!("Invalid code while disabling two-factor for user {}", user.id);
        return Err(ApiError::Unauthorized(
            "Invalid authentication code".to_string(),
        ));
    }

    state.users.disable_two_factor(&user.id).await?;

    info!("Two-factor disabled for user {}", user.id);
    Ok(Json(TwoFactorStatusResponse {
        enabled: false,
        pending_setup: false,
        recovery_codes_remaining: 0,
    }))
}

pub async fn status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<TwoFactorStatusResponse>, ApiError> {
    let user = current_user(&state, &auth).await?;
    let recovery_codes_remaining = if user.two_factor_enabled {
        state.users.count_unused_recovery_codes(&user.id).await?
    } else {
        0
    };

    Ok(Json(TwoFactorStatusResponse {
        enabled: user.two_factor_enabled,
        pending_setup: !user.two_factor_enabled && user.two_factor_secret.is_some(),
        recovery_codes_remaining,
    }))
}
