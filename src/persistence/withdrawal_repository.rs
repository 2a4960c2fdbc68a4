use chrono::Utc;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::models::{CreateWithdrawal, WithdrawalRecord};
use super::{DatabaseError, DbPool};
use crate::domain::entities::withdrawal::WithdrawalStatus;

/// Fields written alongside a status change
#[derive(Debug, Clone, Default)]
pub struct StatusChange {
    pub reject_reason: Option<String>,
    pub payment_reference: Option<String>,
}

/// Withdrawal request repository
#[derive(Clone)]
pub struct WithdrawalRepository {
    pool: DbPool,
}

impl WithdrawalRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, request: CreateWithdrawal) -> Result<WithdrawalRecord, DatabaseError> {
        let now = Utc::now();

        let record = sqlx::query_as::<_, WithdrawalRecord>(
            r#"
            INSERT INTO withdrawal_requests (
                id, user_id, amount, method, bank_code, account_number,
                account_name, promptpay_id, status, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending', ?9, ?9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&request.user_id)
        .bind(request.amount)
        .bind(&request.method)
        .bind(&request.bank_code)
        .bind(&request.account_number)
        .bind(&request.account_name)
        .bind(&request.promptpay_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to create withdrawal for {}: {}", request.user_id, e);
            DatabaseError::from_query("Failed to create withdrawal", e)
        })?;

        info!(
            "Withdrawal {} requested by {}: {} satang via {}",
            record.id, record.user_id, record.amount, record.method
        );
        Ok(record)
    }

    pub async fn get(&self, id: &str) -> Result<Option<WithdrawalRecord>, DatabaseError> {
        sqlx::query_as::<_, WithdrawalRecord>("SELECT * FROM withdrawal_requests WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_query("Failed to get withdrawal", e))
    }

    pub async fn list_for_user(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<WithdrawalRecord>, DatabaseError> {
        sqlx::query_as::<_, WithdrawalRecord>(
            r#"
            SELECT * FROM withdrawal_requests
            WHERE user_id = ?1
            ORDER BY created_at DESC
            LIMIT ?2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_query("Failed to list withdrawals", e))
    }

    /// Requests in `status`, oldest first.
    pub async fn list_by_status(
        &self,
        status: WithdrawalStatus,
        limit: u32,
    ) -> Result<Vec<WithdrawalRecord>, DatabaseError> {
        sqlx::query_as::<_, WithdrawalRecord>(
            r#"
            SELECT * FROM withdrawal_requests
            WHERE status = ?1
            ORDER BY created_at ASC
            LIMIT ?2
            "#,
        )
        .bind(status.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_query("Failed to list withdrawals by status", e))
    }

    /// Whether the user has a request that is pending or approved but unpaid.
    pub async fn has_open_request(&self, user_id: &str) -> Result<bool, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM withdrawal_requests
            WHERE user_id = ?1 AND status IN ('pending', 'approved')
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_query("Failed to check open withdrawals", e))?;
        Ok(count > 0)
    }

    /// Moves a request from `from` to `to`.
    ///
    /// Returns `None` if the request is no longer in `from`, so concurrent
    /// reviewers cannot both apply a transition.
    pub async fn transition(
        &self,
        id: &str,
        from: WithdrawalStatus,
        to: WithdrawalStatus,
        change: StatusChange,
    ) -> Result<Option<WithdrawalRecord>, DatabaseError> {
        let now = Utc::now();
        let processed_at = matches!(to, WithdrawalStatus::Rejected | WithdrawalStatus::Paid)
            .then_some(now);

        let record = sqlx::query_as::<_, WithdrawalRecord>(
            r#"
            UPDATE withdrawal_requests
            SET status = ?1,
                reject_reason = COALESCE(?2, reject_reason),
                payment_reference = COALESCE(?3, payment_reference),
                processed_at = COALESCE(?4, processed_at),
                updated_at = ?5
            WHERE id = ?6 AND status = ?7
            RETURNING *
            "#,
        )
        .bind(to.as_str())
        .bind(&change.reject_reason)
        .bind(&change.payment_reference)
        .bind(processed_at)
        .bind(now)
        .bind(id)
        .bind(from.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to move withdrawal {} to {}: {}", id, to, e);
            DatabaseError::from_query("Failed to update withdrawal", e)
        })?;

        match &record {
            Some(_) => info!("Withdrawal {}: {} -> {}", id, from, to),
            None => debug!("Withdrawal {} was not {}, transition skipped", id, from),
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::init_memory_database;
    use crate::persistence::models::CreateUser;
    use crate::persistence::user_repository::UserRepository;

    async fn setup() -> (WithdrawalRepository, String) {
        let pool = init_memory_database().await.unwrap();
        let user = UserRepository::new(pool.clone())
            .create(CreateUser {
                email: "malee@example.com".to_string(),
                password_hash: "hash".to_string(),
                display_name: None,
                referral_code: "MALEE001".to_string(),
                referrer_id: None,
            })
            .await
            .unwrap();
        (WithdrawalRepository::new(pool), user.id)
    }

    fn bank_request(user_id: &str, amount: i64) -> CreateWithdrawal {
        CreateWithdrawal {
            user_id: user_id.to_string(),
            amount,
            method: "bank".to_string(),
            bank_code: Some("KBANK".to_string()),
            account_number: Some("1234567890".to_string()),
            account_name: "Malee Srisuk".to_string(),
            promptpay_id: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_open_request() {
        let (repo, user_id) = setup().await;
        assert!(!repo.has_open_request(&user_id).await.unwrap());

        let created = repo.create(bank_request(&user_id, 50_000)).await.unwrap();
        assert_eq!(created.status, "pending");
        assert!(repo.has_open_request(&user_id).await.unwrap());

        let fetched = repo.get(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched.amount, 50_000);
        assert_eq!(repo.list_for_user(&user_id, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transition_guards_current_status() {
        let (repo, user_id) = setup().await;
        let created = repo.create(bank_request(&user_id, 50_000)).await.unwrap();

        let approved = repo
            .transition(
                &created.id,
                WithdrawalStatus::Pending,
                WithdrawalStatus::Approved,
                StatusChange::default(),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(approved.status, "approved");
        assert!(approved.processed_at.is_none());

        let stale = repo
            .transition(
                &created.id,
                WithdrawalStatus::Pending,
                WithdrawalStatus::Rejected,
                StatusChange::default(),
            )
            .await
            .unwrap();
        assert!(stale.is_none());

        let paid = repo
            .transition(
                &created.id,
                WithdrawalStatus::Approved,
                WithdrawalStatus::Paid,
                StatusChange {
                    payment_reference: Some("TXN-001".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(paid.payment_reference.as_deref(), Some("TXN-001"));
        assert!(paid.processed_at.is_some());
        assert!(!repo.has_open_request(&user_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_by_status() {
        let (repo, user_id) = setup().await;
        let first = repo.create(bank_request(&user_id, 20_000)).await.unwrap();
        repo.transition(
            &first.id,
            WithdrawalStatus::Pending,
            WithdrawalStatus::Rejected,
            StatusChange {
                reject_reason: Some("name mismatch".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        repo.create(bank_request(&user_id, 30_000)).await.unwrap();

        let pending = repo.list_by_status(WithdrawalStatus::Pending, 50).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].amount, 30_000);

        let rejected = repo.list_by_status(WithdrawalStatus::Rejected, 50).await.unwrap();
        assert_eq!(rejected[0].reject_reason.as_deref(), Some("name mismatch"));
    }
}
