use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use super::mask_destination;
use crate::domain::entities::otp::OtpChannel;
use crate::domain::errors::ProviderError;
use crate::domain::repositories::notifier::{OtpMessage, OtpSender};

/// Development sender used when no gateway is configured.
///
/// Logs that a code was issued without logging the code itself.
pub struct LogOnlySender;

#[async_trait]
impl OtpSender for LogOnlySender {
    async fn send(&self, message: &OtpMessage) -> Result<(), ProviderError> {
        warn!(
            "No {} gateway configured; {} code for {} was not delivered",
            message.channel.as_str(),
            message.purpose.as_str(),
            mask_destination(&message.destination)
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log-only"
    }
}

/// Routes each message to the sender for its channel
pub struct CompositeOtpSender {
    sms: Arc<dyn OtpSender>,
    email: Arc<dyn OtpSender>,
}

impl CompositeOtpSender {
    pub fn new(sms: Arc<dyn OtpSender>, email: Arc<dyn OtpSender>) -> Self {
        Self { sms, email }
    }
}

#[async_trait]
impl OtpSender for CompositeOtpSender {
    async fn send(&self, message: &OtpMessage) -> Result<(), ProviderError> {
        let sender = match message.channel {
            OtpChannel::Sms => &self.sms,
            OtpChannel::Email => &self.email,
        };
        debug!("Dispatching {} OTP via {}", message.channel.as_str(), sender.name());
        sender.send(message).await
    }

    fn name(&self) -> &str {
        "composite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::otp::OtpPurpose;
    use std::sync::Mutex;

    struct Recording {
        label: &'static str,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl OtpSender for Recording {
        async fn send(&self, message: &OtpMessage) -> Result<(), ProviderError> {
            self.seen.lock().unwrap().push(message.destination.clone());
            Ok(())
        }

        fn name(&self) -> &str {
            self.label
        }
    }

    #[tokio::test]
    async fn test_composite_routes_by_channel() {
        let sms = Arc::new(Recording {
            label: "sms",
            seen: Mutex::new(Vec::new()),
        });
        let email = Arc::new(Recording {
            label: "email",
            seen: Mutex::new(Vec::new()),
        });
        let composite = CompositeOtpSender::new(sms.clone(), email.clone());

        composite
            .send(&OtpMessage {
                channel: OtpChannel::Email,
                destination: "somchai@example.com".to_string(),
                code: "123456".to_string(),
                purpose: OtpPurpose::EmailVerification,
                ttl_minutes: 5,
            })
            .await
            .unwrap();

        assert!(sms.seen.lock().unwrap().is_empty());
        assert_eq!(email.seen.lock().unwrap().as_slice(), ["somchai@example.com"]);
    }

    #[tokio::test]
    async fn test_log_only_sender_accepts() {
        let result = LogOnlySender
            .send(&OtpMessage {
                channel: OtpChannel::Sms,
                destination: "+66812345678".to_string(),
                code: "123456".to_string(),
                purpose: OtpPurpose::PhoneVerification,
                ttl_minutes: 5,
            })
            .await;
        assert!(result.is_ok());
    }
}
