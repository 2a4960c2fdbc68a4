//! Operator endpoints under `/api/admin`, authenticated by API key.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::clamp_limit;
use super::withdrawal::WithdrawalView;
use crate::application::extract::ApiJson;
use crate::application::state::AppState;
use crate::domain::entities::signal::{
    normalize_symbol, RetrainAck, RetrainCommand, ALLOWED_TIMEFRAMES,
};
use crate::domain::entities::withdrawal::WithdrawalStatus;
use crate::domain::errors::ApiError;
use crate::domain::services::affiliate::{calculate_commissions, total_payout};
use crate::domain::services::promptpay::build_payload;
use crate::domain::services::withdrawal_policy::check_transition;
use crate::domain::value_objects::bank_account::PromptPayTarget;
use crate::domain::value_objects::money::Money;
use crate::persistence::affiliate_repository::NewSale;
use crate::persistence::models::{CommissionRecord, WithdrawalRecord};
use crate::persistence::withdrawal_repository::StatusChange;
use crate::persistence::DatabaseError;

const MAX_REASON_LENGTH: usize = 500;
const MAX_SOURCE_REF_LENGTH: usize = 128;

#[derive(Debug, Deserialize)]
pub struct RetrainRequest {
    pub symbol: String,
    pub timeframe: String,
    pub reason: Option<String>,
}

/// `amount` is integer satang
#[derive(Debug, Deserialize)]
pub struct RecordSaleRequest {
    pub buyer_id: String,
    pub amount: i64,
    pub source_ref: String,
}

#[derive(Debug, Serialize)]
pub struct RecordSaleResponse {
    pub source_ref: String,
    pub sale_amount: i64,
    pub total_commission: i64,
    pub commissions: Vec<CommissionRecord>,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawalStatusQuery {
    pub status: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct PaidRequest {
    pub reference: String,
}

#[derive(Debug, Serialize)]
pub struct WithdrawalListResponse {
    pub status: WithdrawalStatus,
    pub withdrawals: Vec<WithdrawalView>,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub withdrawal: WithdrawalView,
    /// EMVCo payload for the payout QR, PromptPay approvals only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promptpay_payload: Option<String>,
}

fn required_text(value: &str, field: &str, max_len: usize) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::InvalidRequest(format!("{} is required", field)));
    }
    if trimmed.chars().count() > max_len {
        return Err(ApiError::InvalidRequest(format!(
            "{} must be at most {} characters",
            field, max_len
        )));
    }
    Ok(trimmed.to_string())
}

pub async fn retrain(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RetrainRequest>,
) -> Result<(StatusCode, Json<RetrainAck>), ApiError> {
    let symbol = normalize_symbol(&body.symbol)
        .ok_or_else(|| ApiError::InvalidRequest(format!("Invalid symbol: {}", body.symbol)))?;
    let timeframe = body.timeframe.trim().to_lowercase();
    if !ALLOWED_TIMEFRAMES.contains(&timeframe.as_str()) {
        return Err(ApiError::InvalidRequest(format!(
            "timeframe must be one of {}",
            ALLOWED_TIMEFRAMES.join(", ")
        )));
    }
    let reason = match body.reason.as_deref() {
        Some(r) if !r.trim().is_empty() => Some(required_text(r, "reason", MAX_REASON_LENGTH)?),
        _ => None,
    };

    let command = RetrainCommand {
        symbol,
        timeframe,
        reason,
    };
    let ack = state.providers.signals.request_retrain(&command).await?;
    Ok((StatusCode::ACCEPTED, Json(ack)))
}

/// Records a sale and pays commission up the buyer's referral chain.
pub async fn record_commission(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RecordSaleRequest>,
) -> Result<(StatusCode, Json<RecordSaleResponse>), ApiError> {
    let source_ref = required_text(&body.source_ref, "source_ref", MAX_SOURCE_REF_LENGTH)?;
    let amount = Money::from_satang(body.amount)?;
    if amount == Money::ZERO {
        return Err(ApiError::InvalidRequest("amount must be positive".to_string()));
    }

    let buyer = state
        .users
        .get(&body.buyer_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User {} not found", body.buyer_id)))?;

    let policy = &state.config.affiliate;
    let upline = state.affiliates.upline(&buyer.id, policy.max_levels).await?;
    let shares = calculate_commissions(amount, &upline, policy);
    let total = total_payout(&shares);

    let commissions = state
        .affiliates
        .record_sale(&NewSale {
            source_ref: source_ref.clone(),
            buyer_id: buyer.id.clone(),
            amount: amount.satang(),
            shares,
        })
        .await
        .map_err(|e| match e {
            DatabaseError::Duplicate(_) => {
                ApiError::Conflict(format!("Sale {} was already recorded", source_ref))
            }
            other => ApiError::from(other),
        })?;

    info!(
        "✓ Sale {} by {} ({}) paid {} across {} upline levels",
        source_ref,
        buyer.id,
        amount,
        total,
        commissions.len()
    );

    Ok((
        StatusCode::CREATED,
        Json(RecordSaleResponse {
            source_ref,
            sale_amount: amount.satang(),
            total_commission: total.satang(),
            commissions,
        }),
    ))
}

pub async fn list_withdrawals(
    State(state): State<AppState>,
    Query(query): Query<WithdrawalStatusQuery>,
) -> Result<Json<WithdrawalListResponse>, ApiError> {
    let status = match query.status.as_deref() {
        None => WithdrawalStatus::Pending,
        Some(raw) => WithdrawalStatus::parse(raw)
            .ok_or_else(|| ApiError::InvalidRequest(format!("Unknown status: {}", raw)))?,
    };

    let records = state
        .withdrawals
        .list_by_status(status, clamp_limit(query.limit, 100, 500))
        .await?;

    Ok(Json(WithdrawalListResponse {
        status,
        withdrawals: records.into_iter().map(WithdrawalView::full).collect(),
    }))
}

/// Moves a withdrawal to `to`, guarding against concurrent reviews.
async fn review(
    state: &AppState,
    id: &str,
    to: WithdrawalStatus,
    change: StatusChange,
) -> Result<WithdrawalRecord, ApiError> {
    let current = state
        .withdrawals
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Withdrawal {} not found", id)))?;

    let from = WithdrawalStatus::parse(&current.status).ok_or_else(|| {
        ApiError::InternalServerError(format!(
            "Withdrawal {} has unknown status {}",
            id, current.status
        ))
    })?;
    check_transition(from, to)?;

    state
        .withdrawals
        .transition(id, from, to, change)
        .await?
        .ok_or_else(|| {
            warn!("Withdrawal {} changed while being reviewed", id);
            ApiError::Conflict(format!("Withdrawal {} was modified concurrently", id))
        })
}

pub async fn approve_withdrawal(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReviewResponse>, ApiError> {
    let record = review(&state, &id, WithdrawalStatus::Approved, StatusChange::default()).await?;

    let promptpay_payload = match record.promptpay_id.as_deref() {
        Some(stored) => {
            let target = PromptPayTarget::parse(stored)?;
            Some(build_payload(&target, Some(Money::from_satang(record.amount)?)))
        }
        None => None,
    };

    info!("Withdrawal {} approved ({} satang)", record.id, record.amount);
    Ok(Json(ReviewResponse {
        withdrawal: WithdrawalView::full(record),
        promptpay_payload,
    }))
}

pub async fn reject_withdrawal(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<RejectRequest>,
) -> Result<Json<ReviewResponse>, ApiError> {
    let reason = required_text(&body.reason, "reason", MAX_REASON_LENGTH)?;
    let record = review(
        &state,
        &id,
        WithdrawalStatus::Rejected,
        StatusChange {
            reject_reason: Some(reason),
            ..Default::default()
        },
    )
    .await?;

    info!("Withdrawal {} rejected, funds returned to balance", record.id);
    Ok(Json(ReviewResponse {
        withdrawal: WithdrawalView::full(record),
        promptpay_payload: None,
    }))
}

pub async fn mark_withdrawal_paid(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<PaidRequest>,
) -> Result<Json<ReviewResponse>, ApiError> {
    let reference = required_text(&body.reference, "reference", MAX_SOURCE_REF_LENGTH)?;
    let record = review(
        &state,
        &id,
        WithdrawalStatus::Paid,
        StatusChange {
            payment_reference: Some(reference),
            ..Default::default()
        },
    )
    .await?;

    info!("✓ Withdrawal {} paid", record.id);
    Ok(Json(ReviewResponse {
        withdrawal: WithdrawalView::full(record),
        promptpay_payload: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_text() {
        assert_eq!(required_text("  ok ", "reason", 10).unwrap(), "ok");
        assert!(required_text("   ", "reason", 10).is_err());
        assert!(required_text("abcdefghijk", "reason", 10).is_err());
    }
}
