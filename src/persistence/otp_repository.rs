use chrono::{DateTime, Utc};
use tracing::{debug, error};

use super::models::{CreateOtpAttempt, OtpAttemptRecord};
use crate::domain::services::otp::OtpPolicy;
use super::{DatabaseError, DbPool};

/// OTP attempt repository
#[derive(Clone)]
pub struct OtpRepository {
    pool: DbPool,
}

impl OtpRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Stores a new code unless the destination is over its send limits.
    ///
    /// The window count, the cooldown check and the insert are one
    /// statement, so concurrent requests cannot all pass the same check.
    /// Returns `None` when the send is refused.
    pub async fn issue(
        &self,
        attempt: CreateOtpAttempt,
        now: DateTime<Utc>,
        policy: &OtpPolicy,
    ) -> Result<Option<OtpAttemptRecord>, DatabaseError> {
        let max_sends = i64::try_from(policy.max_sends_per_window).unwrap_or(i64::MAX);

        let record = sqlx::query_as::<_, OtpAttemptRecord>(
            r#"
            INSERT INTO otp_attempts (
                user_id, destination, channel, purpose, code_hash,
                attempts, created_at, expires_at
            )
            SELECT ?1, ?2, ?3, ?4, ?5, 0, ?6, ?7
            WHERE (
                SELECT COUNT(*) FROM otp_attempts
                WHERE destination = ?2 AND purpose = ?4 AND created_at > ?8
            ) < ?9
            AND NOT EXISTS (
                SELECT 1 FROM otp_attempts
                WHERE destination = ?2 AND purpose = ?4 AND created_at > ?10
            )
            RETURNING *
            "#,
        )
        .bind(&attempt.user_id)
        .bind(&attempt.destination)
        .bind(&attempt.channel)
        .bind(&attempt.purpose)
        .bind(&attempt.code_hash)
        .bind(now)
        .bind(attempt.expires_at)
        .bind(now - policy.window)
        .bind(max_sends)
        .bind(now - policy.resend_cooldown)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to store OTP attempt: {}", e);
            DatabaseError::from_query("Failed to store OTP attempt", e)
        })?;

        match &record {
            Some(stored) => debug!("Stored OTP attempt {} ({})", stored.id, stored.purpose),
            None => debug!("OTP send for {} over its limits", attempt.purpose),
        }
        Ok(record)
    }

    /// Creation times of codes sent to a destination since `since`.
    pub async fn send_times_since(
        &self,
        destination: &str,
        purpose: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, DatabaseError> {
        let rows: Vec<(DateTime<Utc>,)> = sqlx::query_as(
            r#"
            SELECT created_at FROM otp_attempts
            WHERE destination = ?1 AND purpose = ?2 AND created_at > ?3
            ORDER BY created_at ASC
            "#,
        )
        .bind(destination)
        .bind(purpose)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_query("Failed to read OTP send history", e))?;

        Ok(rows.into_iter().map(|(t,)| t).collect())
    }

    /// Most recently issued code for a destination and purpose.
    pub async fn latest(
        &self,
        destination: &str,
        purpose: &str,
    ) -> Result<Option<OtpAttemptRecord>, DatabaseError> {
        sqlx::query_as::<_, OtpAttemptRecord>(
            r#"
            SELECT * FROM otp_attempts
            WHERE destination = ?1 AND purpose = ?2
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(destination)
        .bind(purpose)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_query("Failed to read latest OTP", e))
    }

    pub async fn get(&self, id: i64) -> Result<Option<OtpAttemptRecord>, DatabaseError> {
        sqlx::query_as::<_, OtpAttemptRecord>("SELECT * FROM otp_attempts WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_query("Failed to read OTP", e))
    }

    /// Claims one guess against a live code before it is compared.
    ///
    /// Returns the attempt count including this guess, or `None` when the
    /// code is used up, expired or out of guesses.
    pub async fn reserve_attempt(
        &self,
        id: i64,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<u32>, DatabaseError> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE otp_attempts SET attempts = attempts + 1
            WHERE id = ?1 AND attempts < ?2 AND consumed_at IS NULL AND expires_at > ?3
            RETURNING attempts
            "#,
        )
        .bind(id)
        .bind(i64::from(max_attempts))
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_query("Failed to count OTP attempt", e))?;

        Ok(row.map(|(attempts,)| u32::try_from(attempts).unwrap_or(u32::MAX)))
    }

    /// Marks the code used. Returns false if it was already consumed.
    pub async fn consume(&self, id: i64) -> Result<bool, DatabaseError> {
        let rows_affected = sqlx::query(
            "UPDATE otp_attempts SET consumed_at = ?1 WHERE id = ?2 AND consumed_at IS NULL",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_query("Failed to consume OTP", e))?
        .rows_affected();

        Ok(rows_affected > 0)
    }

    /// Deletes codes that expired before `cutoff`.
    pub async fn purge_expired(&self, cutoff: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM otp_attempts WHERE expires_at < ?1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_query("Failed to purge OTP attempts", e))?;
        Ok(result.rows_affected())
    }
}
