//! Registration, login and session endpoints under `/api/auth`.

use axum::{
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::{info, warn};

use super::two_factor::verify_second_factor;
use super::{current_user, request_ip};
use crate::application::extract::ApiJson;
use crate::application::state::AppState;
use crate::auth::{
    hash_password, validate_password, verify_password, verify_password_for_unknown_account,
    AuthUser, TokenPurpose,
};
use crate::domain::entities::user::UserProfile;
use crate::domain::errors::ApiError;
use crate::domain::services::affiliate::{generate_referral_code, normalize_referral_code};
use crate::domain::services::device::DeviceFingerprint;
use crate::domain::value_objects::email::Email;
use crate::persistence::models::{CreateUser, DeviceRecord, UserRecord};
use crate::persistence::DatabaseError;

const MAX_DISPLAY_NAME_LENGTH: usize = 100;
const REFERRAL_CODE_ATTEMPTS: usize = 5;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
    pub referral_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct TwoFactorLoginRequest {
    pub challenge_token: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: UserProfile,
    pub new_device: bool,
}

#[derive(Debug, Serialize)]
pub struct ChallengeResponse {
    pub requires_two_factor: bool,
    pub challenge_token: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum LoginResponse {
    Session(SessionResponse),
    Challenge(ChallengeResponse),
}

#[derive(Debug, Serialize)]
pub struct AuthStatusResponse {
    pub authenticated: bool,
    pub user: UserProfile,
    pub two_factor_enabled: bool,
    pub phone_verified: bool,
    pub email_verified: bool,
}

#[derive(Debug, Serialize)]
pub struct DeviceListResponse {
    pub devices: Vec<DeviceRecord>,
}

/// Where a login came from
struct LoginOrigin {
    fingerprint: DeviceFingerprint,
    ip: Option<String>,
}

impl LoginOrigin {
    fn from_request(headers: &HeaderMap, connect_info: Option<ConnectInfo<SocketAddr>>) -> Self {
        Self {
            fingerprint: DeviceFingerprint::from_headers(headers),
            ip: request_ip(headers, connect_info),
        }
    }
}

/// Records the device and issues an access token.
async fn open_session(
    state: &AppState,
    user: &UserRecord,
    origin: &LoginOrigin,
) -> Result<SessionResponse, ApiError> {
    let sighting = state
        .devices
        .record_sighting(
            &user.id,
            &origin.fingerprint.hash,
            &origin.fingerprint.label,
            origin.ip.as_deref(),
        )
        .await?;

    if sighting.is_new {
        info!(
            "New device for user {}: {}",
            user.id, sighting.device.label
        );
    }

    Ok(SessionResponse {
        token: state.tokens.issue(&user.id, TokenPurpose::Access)?,
        token_type: "Bearer",
        expires_in: state.tokens.access_ttl_seconds(),
        user: UserProfile::from(user),
        new_device: sighting.is_new,
    })
}

fn invalid_credentials() -> ApiError {
    ApiError::Unauthorized("Invalid email or password".to_string())
}

pub async fn register(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let email = Email::parse(&body.email)?;
    validate_password(&body.password)?;

    let display_name = body
        .display_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty());
    if let Some(name) = &display_name {
        if name.chars().count() > MAX_DISPLAY_NAME_LENGTH {
            return Err(ApiError::InvalidRequest(format!(
                "display_name must be at most {} characters",
                MAX_DISPLAY_NAME_LENGTH
            )));
        }
    }

    let referrer_id = match body.referral_code.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => {
            let code = normalize_referral_code(raw)
                .ok_or_else(|| ApiError::InvalidRequest("Invalid referral code".to_string()))?;
            let referrer = state
                .users
                .find_by_referral_code(&code)
                .await?
                .ok_or_else(|| ApiError::InvalidRequest("Unknown referral code".to_string()))?;
            Some(referrer.id)
        }
    };

    if state.users.find_by_email(email.as_str()).await?.is_some() {
        return Err(ApiError::Conflict("Email is already registered".to_string()));
    }

    let password_hash = hash_password(&body.password)?;

    let mut referral_code = generate_referral_code();
    let mut attempts = 1;
    while state.users.referral_code_exists(&referral_code).await? {
        if attempts >= REFERRAL_CODE_ATTEMPTS {
            return Err(ApiError::InternalServerError(
                "Could not allocate a unique referral code".to_string(),
            ));
        }
        referral_code = generate_referral_code();
        attempts += 1;
    }

    let user = state
        .users
        .create(CreateUser {
            email: email.as_str().to_string(),
            password_hash,
            display_name,
            referral_code,
            referrer_id,
        })
        .await
        .map_err(|e| match e {
            // Lost a race with a concurrent registration for the same email
            DatabaseError::Duplicate(_) => {
                ApiError::Conflict("Email is already registered".to_string())
            }
            other => other.into(),
        })?;

    info!(
        "✓ Registered user {} ({}){}",
        user.id,
        email.masked(),
        if user.referrer_id.is_some() { " via referral" } else { "" }
    );

    let origin = LoginOrigin::from_request(&headers, connect_info);
    let session = open_session(&state, &user, &origin).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn login(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let email = Email::parse(&body.email).map_err(|_| invalid_credentials())?;

    let Some(user) = state.users.find_by_email(email.as_str()).await? else {
        // Matches the argon2 cost of a real account
        verify_password_for_unknown_account(&body.password);
        warn!("Login attempt for unknown account {}", email.masked());
        return Err(invalid_credentials());
    };

    if !verify_password(&body.password, &user.password_hash) {
        warn!("Failed login for user {}", user.id);
        return Err(invalid_credentials());
    }

    if user.two_factor_enabled {
        info!("User {} passed password check, awaiting second factor", user.id);
        return Ok(Json(LoginResponse::Challenge(ChallengeResponse {
            requires_two_factor: true,
            challenge_token: state
                .tokens
                .issue(&user.id, TokenPurpose::TwoFactorChallenge)?,
        })));
    }

    let origin = LoginOrigin::from_request(&headers, connect_info);
    let session = open_session(&state, &user, &origin).await?;
    info!("User {} logged in", user.id);
    Ok(Json(LoginResponse::Session(session)))
}

pub async fn login_two_factor(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<TwoFactorLoginRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let claims = state
        .tokens
        .verify(&body.challenge_token, TokenPurpose::TwoFactorChallenge)?;

    let user = state
        .users
        .get(&claims.sub)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid challenge".to_string()))?;

    if !verify_second_factor(&state, &user, &body.code).await? {
        warn!("Invalid second factor for user {}", user.id);
        return Err(ApiError::Unauthorized(
            "Invalid authentication code".to_string(),
        ));
    }

    let origin = LoginOrigin::from_request(&headers, connect_info);
    let session = open_session(&state, &user, &origin).await?;
    info!("User {} logged in with two-factor", user.id);
    Ok(Json(session))
}

pub async fn status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<AuthStatusResponse>, ApiError> {
    let user = current_user(&state, &auth).await?;
    Ok(Json(AuthStatusResponse {
        authenticated: true,
        two_factor_enabled: user.two_factor_enabled,
        phone_verified: user.phone_verified,
        email_verified: user.email_verified,
        user: UserProfile::from(&user),
    }))
}

pub async fn list_devices(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<DeviceListResponse>, ApiError> {
    let devices = state.devices.list_for_user(&auth.user_id).await?;
    Ok(Json(DeviceListResponse { devices }))
}

pub async fn revoke_device(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(device_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.devices.delete(&auth.user_id, &device_id).await? {
        info!("User {} revoked device {}", auth.user_id, device_id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Device {} not found", device_id)))
    }
}
