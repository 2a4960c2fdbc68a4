use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};
use zeroize::Zeroizing;

use super::mask_destination;
use crate::domain::entities::otp::OtpChannel;
use crate::domain::errors::ProviderError;
use crate::domain::repositories::notifier::{OtpMessage, OtpSender};

#[derive(Debug, Serialize)]
struct EmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: String,
    text: String,
}

/// Transactional email API: `POST {url}` with a JSON body and Bearer key.
pub struct EmailGatewayClient {
    client: Client,
    url: String,
    api_key: Zeroizing<String>,
    from: String,
    brand: String,
}

impl EmailGatewayClient {
    pub fn new(
        url: &str,
        api_key: Zeroizing<String>,
        from: &str,
        brand: &str,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(ProviderError::from)?;

        Ok(Self {
            client,
            url: url.to_string(),
            api_key,
            from: from.to_string(),
            brand: brand.to_string(),
        })
    }
}

#[async_trait]
impl OtpSender for EmailGatewayClient {
    async fn send(&self, message: &OtpMessage) -> Result<(), ProviderError> {
        if message.channel != OtpChannel::Email {
            return Err(ProviderError::Rejected(
                "email gateway only delivers email".to_string(),
            ));
        }

        let body = EmailRequest {
            from: &self.from,
            to: &message.destination,
            subject: format!("{} verification code", self.brand),
            text: message.text(&self.brand),
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(self.api_key.as_str())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            warn!(
                "Email gateway rejected message to {}: {} - {}",
                mask_destination(&message.destination),
                status,
                error_text
            );
            return Err(ProviderError::Upstream {
                status,
                body: error_text,
            });
        }

        info!("Email code sent to {}", mask_destination(&message.destination));
        Ok(())
    }

    fn name(&self) -> &str {
        "email-gateway"
    }
}
