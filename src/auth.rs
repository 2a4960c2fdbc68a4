//! Authentication
//!
//! - User sessions: HS256 JWTs carrying `{sub, purpose, exp, iat}`. A login
//!   for an account with 2FA yields a short-lived `two_factor_challenge`
//!   token that can only be exchanged at `/api/auth/login/2fa`.
//! - Admin and internal routes: Bearer API keys from `ADMIN_API_KEYS`.
//! - Passwords: argon2id PHC strings.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use once_cell::sync::Lazy;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use zeroize::Zeroizing;

use crate::domain::errors::{ApiError, ValidationError};
use crate::domain::services::otp::constant_time_eq;

pub const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    Access,
    TwoFactorChallenge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub purpose: TokenPurpose,
    pub exp: i64,
    pub iat: i64,
}

/// Authenticated caller, inserted into request extensions by [`require_user`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

/// Signs and verifies session tokens
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl_seconds: i64,
    challenge_ttl_seconds: i64,
}

impl TokenService {
    pub fn new(secret: &[u8], access_ttl_seconds: i64, challenge_ttl_seconds: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl_seconds,
            challenge_ttl_seconds,
        }
    }

    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    pub fn issue(&self, user_id: &str, purpose: TokenPurpose) -> Result<String, ApiError> {
        let now = Utc::now().timestamp();
        let ttl = match purpose {
            TokenPurpose::Access => self.access_ttl_seconds,
            TokenPurpose::TwoFactorChallenge => self.challenge_ttl_seconds,
        };
        let claims = Claims {
            sub: user_id.to_string(),
            purpose,
            exp: now + ttl,
            iat: now,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ApiError::InternalServerError(format!("Failed to sign token: {}", e)))
    }

    /// Decodes a token and checks it was issued for `purpose`.
    pub fn verify(&self, token: &str, purpose: TokenPurpose) -> Result<Claims, ApiError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            tracing::debug!("Rejected token: {}", e);
            ApiError::Unauthorized("Invalid or expired token".to_string())
        })?;

        if data.claims.purpose != purpose {
            return Err(ApiError::Unauthorized("Token not valid for this operation".to_string()));
        }
        Ok(data.claims)
    }
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let length = password.chars().count();
    if length < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::WeakPassword(format!(
            "must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    if length > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::WeakPassword(format!(
            "must be at most {} characters",
            MAX_PASSWORD_LENGTH
        )));
    }
    if password.trim().is_empty() {
        return Err(ValidationError::WeakPassword("must not be blank".to_string()));
    }
    Ok(())
}

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::InternalServerError(format!("Password hashing failed: {}", e)))
}

/// False for a wrong password and for an unparseable stored hash.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::error!("Stored password hash is malformed: {}", e);
            false
        }
    }
}

static DUMMY_PASSWORD_HASH: Lazy<Option<String>> =
    Lazy::new(|| hash_password("no account has this password").ok());

/// Spends the same argon2 work as a real check, for logins naming an
/// unknown account. Always false.
pub fn verify_password_for_unknown_account(password: &str) -> bool {
    if let Some(hash) = DUMMY_PASSWORD_HASH.as_deref() {
        let _ = verify_password(password, hash);
    }
    false
}

fn bearer_token(request: &Request) -> Result<&str, ApiError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Missing Authorization header");
            ApiError::Unauthorized("Missing Authorization header".to_string())
        })?;

    auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        tracing::warn!("Invalid Authorization header format (expected Bearer token)");
        ApiError::Unauthorized("Expected Bearer token".to_string())
    })
}

/// Middleware for user routes: requires a valid access token.
pub async fn require_user(
    State(tokens): State<Arc<TokenService>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = tokens.verify(bearer_token(&request)?, TokenPurpose::Access)?;
    request.extensions_mut().insert(AuthUser {
        user_id: claims.sub,
    });
    Ok(next.run(request).await)
}

/// Admin API keys, compared in constant time
pub struct ApiKeyStore {
    keys: Vec<Zeroizing<String>>,
}

impl ApiKeyStore {
    pub fn new(keys: Vec<Zeroizing<String>>) -> Self {
        Self { keys }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn is_valid(&self, candidate: &str) -> bool {
        // Every key is compared so timing does not reveal which one matched
        self.keys.iter().fold(false, |found, key| {
            constant_time_eq(key.as_bytes(), candidate.as_bytes()) | found
        })
    }
}

/// Middleware for admin routes: requires a configured API key.
pub async fn require_api_key(
    State(store): State<Arc<ApiKeyStore>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key = bearer_token(&request)?;
    if store.is_valid(key) {
        Ok(next.run(request).await)
    } else {
        tracing::warn!("Invalid API key attempted");
        Err(ApiError::Unauthorized("Invalid API key".to_string()))
    }
}
