use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::persistence::models::UserRecord;

/// Account view returned to its owner. Never carries secrets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub phone_verified: bool,
    pub email_verified: bool,
    pub referral_code: String,
    pub two_factor_enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&UserRecord> for UserProfile {
    fn from(record: &UserRecord) -> Self {
        Self {
            id: record.id.clone(),
            email: record.email.clone(),
            display_name: record.display_name.clone(),
            phone: record.phone.clone(),
            phone_verified: record.phone_verified,
            email_verified: record.email_verified,
            referral_code: record.referral_code.clone(),
            two_factor_enabled: record.two_factor_enabled,
            created_at: record.created_at,
        }
    }
}
