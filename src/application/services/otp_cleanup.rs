use chrono::Utc;
use tracing::info;

use crate::domain::services::otp::OtpPolicy;
use crate::persistence::otp_repository::OtpRepository;
use crate::persistence::DatabaseError;

/// Deletes codes that can no longer be verified or count toward a send window.
pub async fn purge_stale_otps(repo: &OtpRepository, policy: &OtpPolicy) -> Result<u64, DatabaseError> {
    let cutoff = Utc::now() - policy.window;
    let purged = repo.purge_expired(cutoff).await?;
    if purged > 0 {
        info!("Purged {} stale OTP codes", purged);
    }
    Ok(purged)
}
