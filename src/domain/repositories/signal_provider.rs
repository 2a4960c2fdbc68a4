//! Signal Provider Trait
//!
//! Read and command access to the remote trading-signal service. Handlers
//! and the forward-test sync task depend on this trait only, so tests can
//! substitute an in-process implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::entities::signal::{
    ForwardTestSequence, RetrainAck, RetrainCommand, SignalQuery, TradingSignal,
};
use crate::domain::errors::ProviderError;

#[async_trait]
pub trait SignalProvider: Send + Sync {
    async fn recent_signals(&self, query: &SignalQuery) -> Result<Vec<TradingSignal>, ProviderError>;

    /// Sequences updated at or after `since` (all when `None`). Inclusive, so
    /// a sequence sharing the cursor's timestamp is not missed.
    async fn forward_tests(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ForwardTestSequence>, ProviderError>;

    async fn request_retrain(&self, command: &RetrainCommand) -> Result<RetrainAck, ProviderError>;
}
