use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::domain::services::two_factor::TwoFactorError;
use crate::domain::services::withdrawal_policy::WithdrawalRejection;
use crate::persistence::DatabaseError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("Rate limit exceeded, retry in {retry_after_seconds}s")]
    RateLimitExceeded { retry_after_seconds: u64 },

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            ApiError::InternalServerError(detail) => {
                error!("Internal error: {}", detail);
                json!({ "error": "Internal server error" })
            }
            ApiError::Upstream(detail) => {
                error!("Upstream failure: {}", detail);
                json!({ "error": self.to_string() })
            }
            ApiError::RateLimitExceeded {
                retry_after_seconds,
            } => json!({
                "error": self.to_string(),
                "retry_after": retry_after_seconds,
            }),
            _ => json!({ "error": self.to_string() }),
        };

        let mut response = (status, Json(body)).into_response();
        if let ApiError::RateLimitExceeded {
            retry_after_seconds,
        } = self
        {
            if let Ok(value) = HeaderValue::from_str(&retry_after_seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<DatabaseError> for ApiError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::Duplicate(detail) => {
                tracing::warn!("Duplicate write rejected: {}", detail);
                ApiError::Conflict("Resource already exists".to_string())
            }
            other => ApiError::InternalServerError(other.to_string()),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::InvalidRequest(e.to_string())
    }
}

impl From<ProviderError> for ApiError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::InvalidToken(msg) => ApiError::Unauthorized(msg),
            ProviderError::Rejected(msg) => ApiError::InvalidRequest(msg),
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

impl From<TwoFactorError> for ApiError {
    fn from(e: TwoFactorError) -> Self {
        ApiError::InternalServerError(e.to_string())
    }
}

impl From<WithdrawalRejection> for ApiError {
    fn from(e: WithdrawalRejection) -> Self {
        match e {
            WithdrawalRejection::PhoneNotVerified => ApiError::Forbidden(e.to_string()),
            WithdrawalRejection::PendingRequestExists
            | WithdrawalRejection::InvalidTransition { .. } => ApiError::Conflict(e.to_string()),
            WithdrawalRejection::BelowMinimum { .. }
            | WithdrawalRejection::AboveMaximum { .. }
            | WithdrawalRejection::InsufficientBalance { .. } => {
                ApiError::Unprocessable(e.to_string())
            }
        }
    }
}

/// Errors raised by external integrations (SMS, email, Firebase, signal service).
#[derive(Debug, Error, Clone)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProviderError::Decode(e.to_string())
        } else {
            ProviderError::Network(e.to_string())
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid phone number: {0}")]
    InvalidPhoneNumber(String),

    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    #[error("Unknown bank code: {0}")]
    UnknownBank(String),

    #[error("Invalid bank account: {0}")]
    InvalidBankAccount(String),

    #[error("Invalid national ID: {0}")]
    InvalidNationalId(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Weak password: {0}")]
    WeakPassword(String),

    #[error("Value must be non-negative")]
    MustBeNonNegative,

    #[error("Value must be finite")]
    MustBeFinite,
}

impl From<ValidationError> for String {
    fn from(error: ValidationError) -> Self {
        error.to_string()
    }
}
