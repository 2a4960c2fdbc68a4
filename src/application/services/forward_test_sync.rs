//! Incremental copy of forward-test sequences from the signal service.

use thiserror::Error;
use tracing::{debug, info};

use crate::domain::errors::ProviderError;
use crate::domain::repositories::signal_provider::SignalProvider;
use crate::persistence::forward_test_repository::ForwardTestRepository;
use crate::persistence::DatabaseError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Signal service: {0}")]
    Provider(#[from] ProviderError),

    #[error("Storage: {0}")]
    Database(#[from] DatabaseError),
}

/// Fetches sequences updated since the newest stored one and upserts them.
///
/// The cursor is inclusive; rows already stored at the cursor come back and
/// are skipped by the upsert. Returns the number of sequences written.
pub async fn sync_forward_tests(
    provider: &dyn SignalProvider,
    repo: &ForwardTestRepository,
) -> Result<usize, SyncError> {
    let cursor = repo.latest_updated_at().await?;
    debug!("Syncing forward tests since {:?}", cursor);

    let sequences = provider.forward_tests(cursor).await?;
    if sequences.is_empty() {
        return Ok(0);
    }

    let stored = repo.upsert_many(&sequences).await?;
    if stored > 0 {
        info!("✓ Synced {} forward-test sequences", stored);
    }
    Ok(stored)
}
