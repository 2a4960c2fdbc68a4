//! Affiliate ledger: referral tree lookups, recorded sales and the
//! commissions paid for them.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::models::{CommissionRecord, ReferralRecord};
use super::{DatabaseError, DbPool};
use crate::domain::services::affiliate::CommissionShare;

/// A sale together with the shares computed for it
#[derive(Debug, Clone)]
pub struct NewSale {
    pub source_ref: String,
    pub buyer_id: String,
    pub amount: i64,
    pub shares: Vec<CommissionShare>,
}

#[derive(Clone)]
pub struct AffiliateRepository {
    pool: DbPool,
}

impl AffiliateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Referrers above `user_id`, nearest first, at most `max_levels` deep.
    ///
    /// Stops early if the referral chain loops back on itself.
    pub async fn upline(
        &self,
        user_id: &str,
        max_levels: usize,
    ) -> Result<Vec<String>, DatabaseError> {
        let mut upline = Vec::with_capacity(max_levels);
        let mut seen = HashSet::new();
        seen.insert(user_id.to_string());
        let mut current = user_id.to_string();

        while upline.len() < max_levels {
            let referrer: Option<(Option<String>,)> =
                sqlx::query_as("SELECT referrer_id FROM users WHERE id = ?1")
                    .bind(&current)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| DatabaseError::from_query("Failed to walk upline", e))?;

            let Some((Some(referrer_id),)) = referrer else {
                break;
            };
            if !seen.insert(referrer_id.clone()) {
                debug!("Referral cycle detected at {}", referrer_id);
                break;
            }
            upline.push(referrer_id.clone());
            current = referrer_id;
        }

        Ok(upline)
    }

    pub async fn direct_referrals(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ReferralRecord>, DatabaseError> {
        sqlx::query_as::<_, ReferralRecord>(
            r#"
            SELECT id, display_name, email, created_at FROM users
            WHERE referrer_id = ?1
            ORDER BY created_at DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_query("Failed to list referrals", e))
    }

    pub async fn count_direct_referrals(&self, user_id: &str) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE referrer_id = ?1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_query("Failed to count referrals", e))?;
        Ok(count)
    }

    /// Stores a sale and its commission rows atomically.
    ///
    /// A sale whose `source_ref` was already recorded fails with
    /// [`DatabaseError::Duplicate`] and writes nothing.
    pub async fn record_sale(&self, sale: &NewSale) -> Result<Vec<CommissionRecord>, DatabaseError> {
        let now = Utc::now();
        let total: i64 = sale.shares.iter().map(|s| s.amount.satang()).sum();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO affiliate_sales (source_ref, buyer_id, amount, total_commission, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&sale.source_ref)
        .bind(&sale.buyer_id)
        .bind(sale.amount)
        .bind(total)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| DatabaseError::from_query("Failed to record sale", e))?;

        let mut records = Vec::with_capacity(sale.shares.len());
        for share in &sale.shares {
            let record = sqlx::query_as::<_, CommissionRecord>(
                r#"
                INSERT INTO affiliate_commissions (
                    id, source_ref, beneficiary_id, buyer_id, level, sale_amount, amount, created_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&sale.source_ref)
            .bind(&share.beneficiary_id)
            .bind(&sale.buyer_id)
            .bind(share.level as i64)
            .bind(sale.amount)
            .bind(share.amount.satang())
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to record commission for {}: {}", share.beneficiary_id, e);
                DatabaseError::from_query("Failed to record commission", e)
            })?;
            records.push(record);
        }

        tx.commit().await?;

        info!(
            "Recorded sale {} ({} satang): {} commissions totalling {} satang",
            sale.source_ref,
            sale.amount,
            records.len(),
            total
        );
        Ok(records)
    }

    pub async fn commissions_for(
        &self,
        beneficiary_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<CommissionRecord>, DatabaseError> {
        sqlx::query_as::<_, CommissionRecord>(
            r#"
            SELECT * FROM affiliate_commissions
            WHERE beneficiary_id = ?1
            ORDER BY created_at DESC, level ASC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(beneficiary_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_query("Failed to list commissions", e))
    }

    /// Total commission earned, optionally only since `since`.
    pub async fn total_earned(
        &self,
        beneficiary_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<i64, DatabaseError> {
        let (total,): (i64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(amount), 0) FROM affiliate_commissions
            WHERE beneficiary_id = ?1 AND (?2 IS NULL OR created_at >= ?2)
            "#,
        )
        .bind(beneficiary_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_query("Failed to sum commissions", e))?;
        Ok(total)
    }

    /// Earned commission minus everything requested for withdrawal and not rejected.
    pub async fn available_balance(&self, user_id: &str) -> Result<i64, DatabaseError> {
        let (balance,): (i64,) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COALESCE(SUM(amount), 0) FROM affiliate_commissions WHERE beneficiary_id = ?1)
              - (SELECT COALESCE(SUM(amount), 0) FROM withdrawal_requests
                 WHERE user_id = ?1 AND status != 'rejected')
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_query("Failed to compute balance", e))?;
        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::services::affiliate::{calculate_commissions, AffiliatePolicy};
    use crate::domain::value_objects::money::Money;
    use crate::persistence::init_memory_database;
    use crate::persistence::models::CreateUser;
    use crate::persistence::user_repository::UserRepository;

    /// Builds a referral chain and returns ids from the root down.
    async fn chain(users: &UserRepository, depth: usize) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for i in 0..depth {
            let user = users
                .create(CreateUser {
                    email: format!("user{}@example.com", i),
                    password_hash: "hash".to_string(),
                    display_name: Some(format!("User {}", i)),
                    referral_code: format!("CODE{:04}", i),
                    referrer_id: ids.last().cloned(),
                })
                .await
                .unwrap();
            ids.push(user.id);
        }
        ids
    }

    #[tokio::test]
    async fn test_upline_is_nearest_first_and_bounded() {
        let pool = init_memory_database().await.unwrap();
        let users = UserRepository::new(pool.clone());
        let repo = AffiliateRepository::new(pool);
        let ids = chain(&users, 8).await;
        let buyer = ids.last().unwrap();

        let upline = repo.upline(buyer, 5).await.unwrap();
        assert_eq!(upline.len(), 5);
        assert_eq!(upline[0], ids[6]);
        assert_eq!(upline[4], ids[2]);

        assert!(repo.upline(&ids[0], 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upline_stops_on_cycle() {
        let pool = init_memory_database().await.unwrap();
        let users = UserRepository::new(pool.clone());
        let repo = AffiliateRepository::new(pool.clone());
        let ids = chain(&users, 3).await;

        sqlx::query("UPDATE users SET referrer_id = ?1 WHERE id = ?2")
            .bind(&ids[2])
            .bind(&ids[0])
            .execute(&pool)
            .await
            .unwrap();

        let upline = repo.upline(&ids[2], 10).await.unwrap();
        assert_eq!(upline, vec![ids[1].clone(), ids[0].clone()]);
    }

    #[tokio::test]
    async fn test_record_sale_is_idempotent_per_source_ref() {
        let pool = init_memory_database().await.unwrap();
        let users = UserRepository::new(pool.clone());
        let repo = AffiliateRepository::new(pool);
        let ids = chain(&users, 4).await;
        let buyer = ids[3].clone();

        let upline = repo.upline(&buyer, 5).await.unwrap();
        let sale_amount = Money::from_satang(100_000).unwrap();
        let shares = calculate_commissions(sale_amount, &upline, &AffiliatePolicy::default());
        let sale = NewSale {
            source_ref: "order-1".to_string(),
            buyer_id: buyer,
            amount: sale_amount.satang(),
            shares,
        };

        let records = repo.record_sale(&sale).await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].amount, 10_000);
        assert_eq!(records[1].amount, 5_000);
        assert_eq!(records[2].amount, 2_500);

        let err = repo.record_sale(&sale).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Duplicate(_)));

        assert_eq!(repo.total_earned(&ids[2], None).await.unwrap(), 10_000);
        assert_eq!(repo.commissions_for(&ids[0], 50, 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_referrals_and_balance() {
        let pool = init_memory_database().await.unwrap();
        let users = UserRepository::new(pool.clone());
        let repo = AffiliateRepository::new(pool);
        let ids = chain(&users, 2).await;

        assert_eq!(repo.count_direct_referrals(&ids[0]).await.unwrap(), 1);
        let referrals = repo.direct_referrals(&ids[0], 10, 0).await.unwrap();
        assert_eq!(referrals[0].id, ids[1]);

        assert_eq!(repo.available_balance(&ids[0]).await.unwrap(), 0);
        repo.record_sale(&NewSale {
            source_ref: "order-9".to_string(),
            buyer_id: ids[1].clone(),
            amount: 50_000,
            shares: vec![CommissionShare {
                beneficiary_id: ids[0].clone(),
                level: 1,
                amount: Money::from_satang(5_000).unwrap(),
            }],
        })
        .await
        .unwrap();
        assert_eq!(repo.available_balance(&ids[0]).await.unwrap(), 5_000);
    }
}
