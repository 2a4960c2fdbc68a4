use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::two_factor::verify_second_factor;
use super::{clamp_limit, current_user};
use crate::application::extract::ApiJson;
use crate::application::state::AppState;
use crate::auth::AuthUser;
use crate::domain::entities::withdrawal::{WithdrawalDestination, WithdrawalMethod};
use crate::domain::errors::ApiError;
use crate::domain::services::withdrawal_policy::{
    validate_request, WithdrawalContext, WithdrawalRejection,
};
use crate::domain::value_objects::bank_account::{BankAccount, PromptPayTarget};
use crate::domain::value_objects::money::Money;
use crate::persistence::models::{CreateWithdrawal, WithdrawalRecord};
use crate::persistence::DatabaseError;

const MAX_ACCOUNT_NAME_LENGTH: usize = 100;

/// `amount` is integer satang
#[derive(Debug, Deserialize)]
pub struct CreateWithdrawalRequest {
    pub amount: i64,
    pub method: WithdrawalMethod,
    pub bank_code: Option<String>,
    pub account_number: Option<String>,
    pub account_name: String,
    pub promptpay_id: Option<String>,
    pub totp_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawalListQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct WithdrawalView {
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
    pub processed_at: Option<DateTime<Utc>>,
}

fn mask_tail(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let keep = chars.len().min(4);
    let hidden = chars.len() - keep;
    let tail: String = chars[hidden..].iter().collect();
    format!("{}{}", "*".repeat(hidden), tail)
}

impl WithdrawalView {
    /// Owner view: payout identifiers are masked.
    pub fn masked(record: WithdrawalRecord) -> Self {
        let mut view = Self::full(record);
        view.account_number = view.account_number.as_deref().map(mask_tail);
        view.promptpay_id = view.promptpay_id.as_deref().map(mask_tail);
        view
    }

    /// Reviewer view with the full payout details.
    pub fn full(record: WithdrawalRecord) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id,
            amount: record.amount,
            method: record.method,
            bank_code: record.bank_code,
            account_number: record.account_number,
            account_name: record.account_name,
            promptpay_id: record.promptpay_id,
            status: record.status,
            reject_reason: record.reject_reason,
            payment_reference: record.payment_reference,
            created_at: record.created_at,
            processed_at: record.processed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WithdrawalListResponse {
    pub withdrawals: Vec<WithdrawalView>,
}

fn parse_destination(body: &CreateWithdrawalRequest) -> Result<WithdrawalDestination, ApiError> {
    match body.method {
        WithdrawalMethod::Bank => {
            let bank_code = body.bank_code.as_deref().ok_or_else(|| {
                ApiError::InvalidRequest("bank_code is required for bank transfers".to_string())
            })?;
            let account_number = body.account_number.as_deref().ok_or_else(|| {
                ApiError::InvalidRequest(
                    "account_number is required for bank transfers".to_string(),
                )
            })?;
            Ok(WithdrawalDestination::Bank(BankAccount::new(
                bank_code,
                account_number,
                &body.account_name,
            )?))
        }
        WithdrawalMethod::PromptPay => {
            let raw = body.promptpay_id.as_deref().ok_or_else(|| {
                ApiError::InvalidRequest("promptpay_id is required for PromptPay".to_string())
            })?;
            let target = PromptPayTarget::parse(raw)?;
            let account_name = body.account_name.trim();
            if account_name.is_empty() || account_name.chars().count() > MAX_ACCOUNT_NAME_LENGTH {
                return Err(ApiError::InvalidRequest(format!(
                    "account_name must be 1 to {} characters",
                    MAX_ACCOUNT_NAME_LENGTH
                )));
            }
            Ok(WithdrawalDestination::PromptPay {
                target,
                account_name: account_name.to_string(),
            })
        }
    }
}

fn to_create(user_id: &str, amount: Money, destination: &WithdrawalDestination) -> CreateWithdrawal {
    let method = destination.method().as_str().to_string();
    match destination {
        WithdrawalDestination::Bank(account) => CreateWithdrawal {
            user_id: user_id.to_string(),
            amount: amount.satang(),
            method,
            bank_code: Some(account.bank_code().to_string()),
            account_number: Some(account.account_number().to_string()),
            account_name: account.account_name().to_string(),
            promptpay_id: None,
        },
        WithdrawalDestination::PromptPay {
            target,
            account_name,
        } => CreateWithdrawal {
            user_id: user_id.to_string(),
            amount: amount.satang(),
            method,
            bank_code: None,
            account_number: None,
            account_name: account_name.clone(),
            promptpay_id: Some(target.as_stored()),
        },
    }
}

pub async fn create(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    ApiJson(body): ApiJson<CreateWithdrawalRequest>,
) -> Result<(StatusCode, Json<WithdrawalView>), ApiError> {
    let user = current_user(&state, &auth).await?;

    if user.two_factor_enabled {
        let code = body.totp_code.as_deref().ok_or_else(|| {
            ApiError::Forbidden("Two-factor code is required for withdrawals".to_string())
        })?;
        if !verify_second_factor(&state, &user, code).await? {
            warn!("Invalid second factor on withdrawal by user {}", user.id);
            return Err(ApiError::Unauthorized(
                "Invalid authentication code".to_string(),
            ));
        }
    }

    let amount = Money::from_satang(body.amount)?;
    let destination = parse_destination(&body)?;

    let context = WithdrawalContext {
        available_balance: Money::from_satang(
            state.affiliates.available_balance(&user.id).await?.max(0),
        )?,
        has_open_request: state.withdrawals.has_open_request(&user.id).await?,
        phone_verified: user.phone_verified,
    };
    validate_request(amount, &context, &state.config.withdrawal)?;

    let record = state
        .withdrawals
        .create(to_create(&user.id, amount, &destination))
        .await
        .map_err(|e| match e {
            // One open request per user is also enforced by a unique index
            DatabaseError::Duplicate(_) => ApiError::from(WithdrawalRejection::PendingRequestExists),
            other => ApiError::from(other),
        })?;

    info!(
        "Withdrawal {} requested by user {}: {} via {}",
        record.id,
        user.id,
        amount,
        destination.method().as_str()
    );
    Ok((StatusCode::CREATED, Json(WithdrawalView::masked(record))))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<WithdrawalListQuery>,
) -> Result<Json<WithdrawalListResponse>, ApiError> {
    let records = state
        .withdrawals
        .list_for_user(&auth.user_id, clamp_limit(query.limit, 50, 100))
        .await?;
    Ok(Json(WithdrawalListResponse {
        withdrawals: records.into_iter().map(WithdrawalView::masked).collect(),
    }))
}
