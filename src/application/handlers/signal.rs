use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::clamp_limit;
use crate::application::state::AppState;
use crate::domain::entities::signal::{
    normalize_symbol, ForwardTestSequence, SignalQuery, TradingSignal,
};
use crate::domain::errors::ApiError;
use crate::persistence::models::ForwardTestRecord;

const MAX_RECENT_SIGNALS: u32 = 200;
const MAX_FORWARD_TESTS: u32 = 500;

#[derive(Debug, Deserialize)]
pub struct SignalListQuery {
    pub symbol: Option<String>,
    pub limit: Option<u32>,
}

impl SignalListQuery {
    fn symbol(&self) -> Result<Option<String>, ApiError> {
        match self.symbol.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => normalize_symbol(raw)
                .map(Some)
                .ok_or_else(|| ApiError::InvalidRequest(format!("Invalid symbol: {}", raw))),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecentSignalsResponse {
    pub signals: Vec<TradingSignal>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ForwardTestsResponse {
    pub sequences: Vec<ForwardTestSequence>,
    pub count: usize,
    pub last_synced_update: Option<DateTime<Utc>>,
}

/// Live passthrough to the signal service.
pub async fn recent(
    State(state): State<AppState>,
    Query(params): Query<SignalListQuery>,
) -> Result<Json<RecentSignalsResponse>, ApiError> {
    let query = SignalQuery {
        symbol: params.symbol()?,
        limit: clamp_limit(params.limit, 50, MAX_RECENT_SIGNALS),
    };

    let signals = state.providers.signals.recent_signals(&query).await?;
    Ok(Json(RecentSignalsResponse {
        count: signals.len(),
        signals,
    }))
}

/// Locally stored history, refreshed by the background sync.
pub async fn forward_tests(
    State(state): State<AppState>,
    Query(params): Query<SignalListQuery>,
) -> Result<Json<ForwardTestsResponse>, ApiError> {
    let symbol = params.symbol()?;
    let limit = clamp_limit(params.limit, 100, MAX_FORWARD_TESTS);

    let records = state
        .forward_tests
        .list_recent(symbol.as_deref(), limit)
        .await?;
    let last_synced_update = state.forward_tests.latest_updated_at().await?;

    let sequences: Vec<ForwardTestSequence> = records
        .into_iter()
        .map(ForwardTestRecord::into_sequence)
        .collect();

    Ok(Json(ForwardTestsResponse {
        count: sequences.len(),
        sequences,
        last_synced_update,
    }))
}
