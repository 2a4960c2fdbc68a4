use chrono::{DateTime, Utc};
use tracing::{debug, error};

use super::models::ForwardTestRecord;
use super::{DatabaseError, DbPool};
use crate::domain::entities::signal::{ForwardTestSequence, SignalSide};

/// Local copy of forward-test sequences pulled from the signal service
#[derive(Clone)]
pub struct ForwardTestRepository {
    pool: DbPool,
}

impl ForwardTestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Inserts or refreshes sequences. Returns how many rows changed; a
    /// sequence already stored at the same `updated_at` is left alone.
    pub async fn upsert_many(&self, sequences: &[ForwardTestSequence]) -> Result<usize, DatabaseError> {
        if sequences.is_empty() {
            return Ok(0);
        }

        let mut written = 0u64;
        let mut tx = self.pool.begin().await?;
        for seq in sequences {
            let result = sqlx::query(
                r#"
                INSERT INTO forward_test_sequences (
                    sequence_id, symbol, timeframe, model_version, side, entry_price,
                    exit_price, pnl_percent, status, opened_at, closed_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                ON CONFLICT(sequence_id) DO UPDATE SET
                    exit_price = excluded.exit_price,
                    pnl_percent = excluded.pnl_percent,
                    status = excluded.status,
                    closed_at = excluded.closed_at,
                    updated_at = excluded.updated_at
                WHERE excluded.updated_at > forward_test_sequences.updated_at
                "#,
            )
            .bind(&seq.sequence_id)
            .bind(&seq.symbol)
            .bind(&seq.timeframe)
            .bind(&seq.model_version)
            .bind(seq.side.as_str())
            .bind(seq.entry_price)
            .bind(seq.exit_price)
            .bind(seq.pnl_percent)
            .bind(&seq.status)
            .bind(seq.opened_at)
            .bind(seq.closed_at)
            .bind(seq.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to store forward test {}: {}", seq.sequence_id, e);
                DatabaseError::from_query("Failed to store forward test", e)
            })?;
            written += result.rows_affected();
        }
        tx.commit().await?;

        debug!("Stored {} of {} forward-test sequences", written, sequences.len());
        Ok(written as usize)
    }

    pub async fn list_recent(
        &self,
        symbol: Option<&str>,
        limit: u32,
    ) -> Result<Vec<ForwardTestRecord>, DatabaseError> {
        sqlx::query_as::<_, ForwardTestRecord>(
            r#"
            SELECT * FROM forward_test_sequences
            WHERE (?1 IS NULL OR symbol = ?1)
            ORDER BY opened_at DESC
            LIMIT ?2
            "#,
        )
        .bind(symbol)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_query("Failed to list forward tests", e))
    }

    /// High-water mark for incremental sync.
    pub async fn latest_updated_at(&self) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        let row: Option<(DateTime<Utc>,)> = sqlx::query_as(
            "SELECT updated_at FROM forward_test_sequences ORDER BY updated_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_query("Failed to read sync cursor", e))?;
        Ok(row.map(|(t,)| t))
    }
}

impl ForwardTestRecord {
    pub fn into_sequence(self) -> ForwardTestSequence {
        ForwardTestSequence {
            side: SignalSide::parse(&self.side).unwrap_or(SignalSide::Hold),
            sequence_id: self.sequence_id,
            symbol: self.symbol,
            timeframe: self.timeframe,
            model_version: self.model_version,
            entry_price: self.entry_price,
            exit_price: self.exit_price,
            pnl_percent: self.pnl_percent,
            status: self.status,
            opened_at: self.opened_at,
            closed_at: self.closed_at,
            updated_at: self.updated_at,
        }
    }
}
