//! Outbound OTP delivery port.

use async_trait::async_trait;

use crate::domain::entities::otp::{OtpChannel, OtpPurpose};
use crate::domain::errors::ProviderError;

#[derive(Debug, Clone)]
pub struct OtpMessage {
    pub channel: OtpChannel,
    /// E.164 phone number or email address
    pub destination: String,
    pub code: String,
    pub purpose: OtpPurpose,
    pub ttl_minutes: i64,
}

impl OtpMessage {
    pub fn text(&self, brand: &str) -> String {
        format!(
            "[{}] Your verification code is {}. It expires in {} minutes. Never share this code.",
            brand, self.code, self.ttl_minutes
        )
    }
}

/// Delivers one-time codes over SMS or email.
#[async_trait]
pub trait OtpSender: Send + Sync {
    async fn send(&self, message: &OtpMessage) -> Result<(), ProviderError>;

    fn name(&self) -> &str;
}
