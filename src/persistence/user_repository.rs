use chrono::Utc;
use sqlx::{Sqlite, Transaction};
use tracing::{debug, error};
use uuid::Uuid;

use super::models::{CreateUser, UserRecord};
use super::{DatabaseError, DbPool};

/// User repository
#[derive(Clone)]
pub struct UserRepository {
    pool: DbPool,
}

impl UserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a new user
    pub async fn create(&self, user: CreateUser) -> Result<UserRecord, DatabaseError> {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();

        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            INSERT INTO users (
                id, email, password_hash, display_name, referral_code,
                referrer_id, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.display_name)
        .bind(&user.referral_code)
        .bind(&user.referrer_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to create user: {}", e);
            DatabaseError::from_query("Failed to create user", e)
        })?;

        debug!("Created user: {}", record.id);
        Ok(record)
    }

    pub async fn get(&self, id: &str) -> Result<Option<UserRecord>, DatabaseError> {
        sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to get user {}: {}", id, e);
                DatabaseError::from_query("Failed to get user", e)
            })
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, DatabaseError> {
        sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE email = ?1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to look up user by email: {}", e);
                DatabaseError::from_query("Failed to look up user", e)
            })
    }

    pub async fn find_by_referral_code(
        &self,
        code: &str,
    ) -> Result<Option<UserRecord>, DatabaseError> {
        sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE referral_code = ?1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to look up referral code {}: {}", code, e);
                DatabaseError::from_query("Failed to look up referral code", e)
            })
    }

    pub async fn find_by_phone(&self, phone: &str) -> Result<Option<UserRecord>, DatabaseError> {
        sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE phone = ?1")
            .bind(phone)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to look up user by phone: {}", e);
                DatabaseError::from_query("Failed to look up user by phone", e)
            })
    }

    pub async fn referral_code_exists(&self, code: &str) -> Result<bool, DatabaseError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM users WHERE referral_code = ?1")
                .bind(code)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| DatabaseError::from_query("Failed to check referral code", e))?;
        Ok(count > 0)
    }

    /// Marks a phone number as verified for the user.
    pub async fn set_phone_verified(&self, id: &str, phone: &str) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE users SET phone = ?1, phone_verified = 1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(phone)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to set phone for user {}: {}", id, e);
            DatabaseError::from_query("Failed to set phone", e)
        })?;

        ensure_updated(result.rows_affected(), id, "set phone")
    }

    pub async fn set_email_verified(&self, id: &str) -> Result<(), DatabaseError> {
        let result =
            sqlx::query("UPDATE users SET email_verified = 1, updated_at = ?1 WHERE id = ?2")
                .bind(Utc::now())
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| DatabaseError::from_query("Failed to verify email", e))?;

        ensure_updated(result.rows_affected(), id, "verify email")
    }

    /// Stores a secret awaiting confirmation. 2FA stays disabled.
    pub async fn set_pending_two_factor(&self, id: &str, secret: &str) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE users SET two_factor_secret = ?1, two_factor_enabled = 0, \
             two_factor_last_step = NULL, updated_at = ?2 \
             WHERE id = ?3 AND two_factor_enabled = 0",
        )
        .bind(secret)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_query("Failed to store 2FA secret", e))?;

        ensure_updated(result.rows_affected(), id, "store 2FA secret")
    }

    /// Turns on 2FA and stores the recovery code hashes in one transaction.
    ///
    /// Only succeeds while `secret` is still the pending secret and 2FA is
    /// off; returns false otherwise. `step` is the TOTP step that confirmed
    /// the secret.
    pub async fn enable_two_factor(
        &self,
        id: &str,
        secret: &str,
        step: i64,
        recovery_code_hashes: &[String],
    ) -> Result<bool, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let rows_affected = sqlx::query(
            "UPDATE users SET two_factor_enabled = 1, two_factor_last_step = ?1, updated_at = ?2 \
             WHERE id = ?3 AND two_factor_secret = ?4 AND two_factor_enabled = 0",
        )
        .bind(step)
        .bind(Utc::now())
        .bind(id)
        .bind(secret)
        .execute(&mut *tx)
        .await
        .map_err(|e| DatabaseError::from_query("Failed to enable 2FA", e))?
        .rows_affected();

        if rows_affected == 0 {
            tx.rollback().await?;
            debug!("2FA for user {} was not pending, nothing enabled", id);
            return Ok(false);
        }

        sqlx::query("DELETE FROM recovery_codes WHERE user_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| DatabaseError::from_query("Failed to clear recovery codes", e))?;
        insert_recovery_codes(&mut tx, id, recovery_code_hashes).await?;
        tx.commit().await?;
        debug!("Updated user {}: enable 2FA", id);
        Ok(true)
    }

    /// Records `step` as used if it is newer than the last accepted step.
    /// Returns false when the code was already spent.
    pub async fn advance_totp_step(&self, id: &str, step: i64) -> Result<bool, DatabaseError> {
        let rows_affected = sqlx::query(
            "UPDATE users SET two_factor_last_step = ?1 \
             WHERE id = ?2 AND two_factor_enabled = 1 \
             AND (two_factor_last_step IS NULL OR two_factor_last_step < ?1)",
        )
        .bind(step)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_query("Failed to record TOTP step", e))?
        .rows_affected();

        Ok(rows_affected > 0)
    }

    pub async fn disable_two_factor(&self, id: &str) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE users SET two_factor_enabled = 0, two_factor_secret = NULL, \
             two_factor_last_step = NULL, updated_at = ?1 WHERE id = ?2",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| DatabaseError::from_query("Failed to disable 2FA", e))?;
        ensure_updated(result.rows_affected(), id, "disable 2FA")?;

        sqlx::query("DELETE FROM recovery_codes WHERE user_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| DatabaseError::from_query("Failed to clear recovery codes", e))?;

        tx.commit().await?;
        Ok(())
    }

    /// Marks a matching unused recovery code as used. Returns false if none matched.
    pub async fn consume_recovery_code(
        &self,
        user_id: &str,
        code_hash: &str,
    ) -> Result<bool, DatabaseError> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE recovery_codes SET used_at = ?1
            WHERE id = (
                SELECT id FROM recovery_codes
                WHERE user_id = ?2 AND code_hash = ?3 AND used_at IS NULL
                LIMIT 1
            )
            "#,
        )
        .bind(Utc::now())
        .bind(user_id)
        .bind(code_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_query("Failed to consume recovery code", e))?
        .rows_affected();

        Ok(rows_affected > 0)
    }

    pub async fn count_unused_recovery_codes(&self, user_id: &str) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM recovery_codes WHERE user_id = ?1 AND used_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_query("Failed to count recovery codes", e))?;
        Ok(count)
    }
}

async fn insert_recovery_codes(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: &str,
    code_hashes: &[String],
) -> Result<(), DatabaseError> {
    let now = Utc::now();
    for hash in code_hashes {
        sqlx::query(
            "INSERT INTO recovery_codes (user_id, code_hash, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(user_id)
        .bind(hash)
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(|e| DatabaseError::from_query("Failed to store recovery code", e))?;
    }
    Ok(())
}

fn ensure_updated(rows_affected: u64, id: &str, action: &str) -> Result<(), DatabaseError> {
    if rows_affected == 0 {
        return Err(DatabaseError::QueryError(format!(
            "Cannot {}: user {} not found or not eligible",
            action, id
        )));
    }
    debug!("Updated user {}: {}", id, action);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::init_memory_database;

    fn new_user(email: &str, code: &str, referrer: Option<String>) -> CreateUser {
        CreateUser {
            email: email.to_string(),
            password_hash: "$argon2id$placeholder".to_string(),
            display_name: None,
            referral_code: code.to_string(),
            referrer_id: referrer,
        }
    }

    #[tokio::test]
    async fn test_user_crud() {
        let pool = init_memory_database().await.unwrap();
        let repo = UserRepository::new(pool);

        let created = repo.create(new_user("a@example.com", "CODEAAAA", None)).await.unwrap();
        assert!(!created.phone_verified);
        assert!(!created.two_factor_enabled);

        let fetched = repo.find_by_email("a@example.com").await.unwrap().unwrap();
        assert_eq!(fetched.id, created.id);

        let by_code = repo.find_by_referral_code("CODEAAAA").await.unwrap().unwrap();
        assert_eq!(by_code.id, created.id);
        assert!(repo.referral_code_exists("CODEAAAA").await.unwrap());
        assert!(!repo.referral_code_exists("NOPE").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_email_is_reported() {
        let pool = init_memory_database().await.unwrap();
        let repo = UserRepository::new(pool);

        repo.create(new_user("a@example.com", "CODE0001", None)).await.unwrap();
        let err = repo
            .create(new_user("a@example.com", "CODE0002", None))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_verification_flags() {
        let pool = init_memory_database().await.unwrap();
        let repo = UserRepository::new(pool);
        let user = repo.create(new_user("a@example.com", "CODE0001", None)).await.unwrap();

        repo.set_phone_verified(&user.id, "+66812345678").await.unwrap();
        repo.set_email_verified(&user.id).await.unwrap();

        let user = repo.get(&user.id).await.unwrap().unwrap();
        assert!(user.phone_verified);
        assert!(user.email_verified);
        assert_eq!(user.phone.as_deref(), Some("+66812345678"));
        assert!(repo.find_by_phone("+66812345678").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_two_factor_lifecycle() {
        let pool = init_memory_database().await.unwrap();
        let repo = UserRepository::new(pool);
        let user = repo.create(new_user("a@example.com", "CODE0001", None)).await.unwrap();

        let hashes = vec!["h1".to_string(), "h2".to_string()];

        // Cannot enable without a pending secret
        assert!(!repo
            .enable_two_factor(&user.id, "JBSWY3DPEHPK3PXP", 100, &hashes)
            .await
            .unwrap());

        repo.set_pending_two_factor(&user.id, "JBSWY3DPEHPK3PXP").await.unwrap();
        assert!(repo
            .enable_two_factor(&user.id, "JBSWY3DPEHPK3PXP", 100, &hashes)
            .await
            .unwrap());
        let enabled = repo.get(&user.id).await.unwrap().unwrap();
        assert!(enabled.two_factor_enabled);
        assert_eq!(enabled.two_factor_last_step, Some(100));
        assert_eq!(repo.count_unused_recovery_codes(&user.id).await.unwrap(), 2);

        // A second enable finds nothing pending and leaves the codes alone
        assert!(!repo
            .enable_two_factor(&user.id, "JBSWY3DPEHPK3PXP", 101, &["h3".to_string()])
            .await
            .unwrap());
        assert_eq!(repo.count_unused_recovery_codes(&user.id).await.unwrap(), 2);

        repo.disable_two_factor(&user.id).await.unwrap();
        let user = repo.get(&user.id).await.unwrap().unwrap();
        assert!(!user.two_factor_enabled);
        assert!(user.two_factor_secret.is_none());
    }

    #[tokio::test]
    async fn test_totp_steps_only_move_forward() {
        let pool = init_memory_database().await.unwrap();
        let repo = UserRepository::new(pool);
        let user = repo.create(new_user("a@example.com", "CODE0001", None)).await.unwrap();
        repo.set_pending_two_factor(&user.id, "JBSWY3DPEHPK3PXP").await.unwrap();
        repo.enable_two_factor(&user.id, "JBSWY3DPEHPK3PXP", 100, &[])
            .await
            .unwrap();

        assert!(!repo.advance_totp_step(&user.id, 100).await.unwrap());
        assert!(repo.advance_totp_step(&user.id, 101).await.unwrap());
        assert!(!repo.advance_totp_step(&user.id, 101).await.unwrap());
        assert!(!repo.advance_totp_step(&user.id, 99).await.unwrap());
    }

    #[tokio::test]
    async fn test_recovery_codes_are_single_use() {
        let pool = init_memory_database().await.unwrap();
        let repo = UserRepository::new(pool);
        let user = repo.create(new_user("a@example.com", "CODE0001", None)).await.unwrap();

        repo.set_pending_two_factor(&user.id, "JBSWY3DPEHPK3PXP").await.unwrap();
        repo.enable_two_factor(
            &user.id,
            "JBSWY3DPEHPK3PXP",
            100,
            &["h1".to_string(), "h2".to_string()],
        )
        .await
        .unwrap();
        assert_eq!(repo.count_unused_recovery_codes(&user.id).await.unwrap(), 2);

        assert!(repo.consume_recovery_code(&user.id, "h1").await.unwrap());
        assert!(!repo.consume_recovery_code(&user.id, "h1").await.unwrap());
        assert_eq!(repo.count_unused_recovery_codes(&user.id).await.unwrap(), 1);
    }
}
