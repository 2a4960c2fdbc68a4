use chrono::Utc;
use tracing::{error, info};
use uuid::Uuid;

use super::models::DeviceRecord;
use super::{DatabaseError, DbPool};

/// Result of recording a login from a device
#[derive(Debug, Clone)]
pub struct DeviceSighting {
    pub device: DeviceRecord,
    pub is_new: bool,
}

/// Known-device repository
#[derive(Clone)]
pub struct DeviceRepository {
    pool: DbPool,
}

impl DeviceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Records a sighting of `fingerprint` for `user_id`, inserting it on first sight.
    pub async fn record_sighting(
        &self,
        user_id: &str,
        fingerprint: &str,
        label: &str,
        ip: Option<&str>,
    ) -> Result<DeviceSighting, DatabaseError> {
        let now = Utc::now();

        let updated = sqlx::query_as::<_, DeviceRecord>(
            r#"
            UPDATE devices SET last_seen_at = ?1, last_ip = COALESCE(?2, last_ip), label = ?3
            WHERE user_id = ?4 AND fingerprint = ?5
            RETURNING *
            "#,
        )
        .bind(now)
        .bind(ip)
        .bind(label)
        .bind(user_id)
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_query("Failed to update device", e))?;

        if let Some(device) = updated {
            return Ok(DeviceSighting {
                device,
                is_new: false,
            });
        }

        let device = sqlx::query_as::<_, DeviceRecord>(
            r#"
            INSERT INTO devices (id, user_id, fingerprint, label, last_ip, first_seen_at, last_seen_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(fingerprint)
        .bind(label)
        .bind(ip)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to insert device for {}: {}", user_id, e);
            DatabaseError::from_query("Failed to insert device", e)
        })?;

        info!("New device for user {}: {}", user_id, device.label);
        Ok(DeviceSighting {
            device,
            is_new: true,
        })
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<DeviceRecord>, DatabaseError> {
        sqlx::query_as::<_, DeviceRecord>(
            "SELECT * FROM devices WHERE user_id = ?1 ORDER BY last_seen_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_query("Failed to list devices", e))
    }

    /// Removes a device owned by `user_id`. Returns false when nothing matched.
    pub async fn delete(&self, user_id: &str, device_id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM devices WHERE id = ?1 AND user_id = ?2")
            .bind(device_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_query("Failed to delete device", e))?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::init_memory_database;
    use crate::persistence::models::CreateUser;
    use crate::persistence::user_repository::UserRepository;

    async fn setup() -> (DeviceRepository, String) {
        let pool = init_memory_database().await.unwrap();
        let user = UserRepository::new(pool.clone())
            .create(CreateUser {
                email: "somchai@example.com".to_string(),
                password_hash: "hash".to_string(),
                display_name: None,
                referral_code: "SOMCHAI1".to_string(),
                referrer_id: None,
            })
            .await
            .unwrap();
        (DeviceRepository::new(pool), user.id)
    }

    #[tokio::test]
    async fn test_first_sighting_is_new() {
        let (repo, user_id) = setup().await;

        let first = repo
            .record_sighting(&user_id, "fp-1", "Chrome on Windows", Some("10.0.0.1"))
            .await
            .unwrap();
        assert!(first.is_new);

        let again = repo
            .record_sighting(&user_id, "fp-1", "Chrome on Windows", None)
            .await
            .unwrap();
        assert!(!again.is_new);
        assert_eq!(again.device.id, first.device.id);
        assert_eq!(again.device.last_ip.as_deref(), Some("10.0.0.1"));
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let (repo, user_id) = setup().await;
        let a = repo.record_sighting(&user_id, "fp-a", "Safari on iOS", None).await.unwrap();
        repo.record_sighting(&user_id, "fp-b", "Firefox on Linux", None).await.unwrap();

        assert_eq!(repo.list_for_user(&user_id).await.unwrap().len(), 2);

        assert!(repo.delete(&user_id, &a.device.id).await.unwrap());
        assert!(!repo.delete(&user_id, &a.device.id).await.unwrap());
        assert!(!repo.delete("someone-else", "missing").await.unwrap());
        assert_eq!(repo.list_for_user(&user_id).await.unwrap().len(), 1);
    }
}
