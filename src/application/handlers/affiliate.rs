use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{clamp_limit, current_user};
use crate::application::state::AppState;
use crate::auth::AuthUser;
use crate::domain::errors::ApiError;
use crate::domain::value_objects::email::Email;
use crate::persistence::models::CommissionRecord;

/// Pagination for list endpoints (limit default 50, max 100)
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl PageQuery {
    fn limit(&self) -> u32 {
        clamp_limit(self.limit, 50, 100)
    }

    fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }
}

/// Amounts are integer satang
#[derive(Debug, Serialize)]
pub struct AffiliateSummary {
    pub referral_code: String,
    pub direct_referrals: i64,
    pub total_earned: i64,
    pub earned_last_30_days: i64,
    pub available_balance: i64,
    pub commission_levels: usize,
}

#[derive(Debug, Serialize)]
pub struct ReferralView {
    pub id: String,
    pub display_name: Option<String>,
    pub email: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ReferralListResponse {
    pub referrals: Vec<ReferralView>,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct CommissionListResponse {
    pub commissions: Vec<CommissionRecord>,
}

pub async fn summary(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<AffiliateSummary>, ApiError> {
    let user = current_user(&state, &auth).await?;

    let direct_referrals = state.affiliates.count_direct_referrals(&user.id).await?;
    let total_earned = state.affiliates.total_earned(&user.id, None).await?;
    let earned_last_30_days = state
        .affiliates
        .total_earned(&user.id, Some(Utc::now() - Duration::days(30)))
        .await?;
    let available_balance = state.affiliates.available_balance(&user.id).await?;

    Ok(Json(AffiliateSummary {
        referral_code: user.referral_code,
        direct_referrals,
        total_earned,
        earned_last_30_days,
        available_balance,
        commission_levels: state.config.affiliate.max_levels,
    }))
}

pub async fn referrals(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(page): Query<PageQuery>,
) -> Result<Json<ReferralListResponse>, ApiError> {
    let records = state
        .affiliates
        .direct_referrals(&auth.user_id, page.limit(), page.offset())
        .await?;
    let total = state.affiliates.count_direct_referrals(&auth.user_id).await?;

    let referrals = records
        .into_iter()
        .map(|r| ReferralView {
            email: Email::parse(&r.email)
                .map(|e| e.masked())
                .unwrap_or_else(|_| "***".to_string()),
            id: r.id,
            display_name: r.display_name,
            joined_at: r.created_at,
        })
        .collect();

    Ok(Json(ReferralListResponse { referrals, total }))
}

pub async fn commissions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(page): Query<PageQuery>,
) -> Result<Json<CommissionListResponse>, ApiError> {
    let commissions = state
        .affiliates
        .commissions_for(&auth.user_id, page.limit(), page.offset())
        .await?;
    Ok(Json(CommissionListResponse { commissions }))
}
