use async_trait::async_trait;

use crate::domain::errors::ProviderError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPhone {
    pub provider_uid: String,
    /// E.164 as reported by the provider
    pub phone_number: String,
}

/// Verifies phone ownership proven to a third-party (Firebase) on the client.
#[async_trait]
pub trait PhoneAuthVerifier: Send + Sync {
    async fn verify_id_token(&self, id_token: &str) -> Result<VerifiedPhone, ProviderError>;
}
