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
struct SmsRequest<'a> {
    to: &'a str,
    message: String,
    sender: &'a str,
}

/// HTTP SMS gateway: `POST {url}` with a JSON body and Bearer key.
pub struct SmsGatewayClient {
    client: Client,
    url: String,
    api_key: Zeroizing<String>,
    sender: String,
    brand: String,
}

impl SmsGatewayClient {
    pub fn new(
        url: &str,
        api_key: Zeroizing<String>,
        sender: &str,
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
            sender: sender.to_string(),
            brand: brand.to_string(),
        })
    }
}

#[async_trait]
impl OtpSender for SmsGatewayClient {
    async fn send(&self, message: &OtpMessage) -> Result<(), ProviderError> {
        if message.channel != OtpChannel::Sms {
            return Err(ProviderError::Rejected(
                "SMS gateway only delivers SMS".to_string(),
            ));
        }

        let body = SmsRequest {
            to: &message.destination,
            message: message.text(&self.brand),
            sender: &self.sender,
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
                "SMS gateway rejected message to {}: {} - {}",
                mask_destination(&message.destination),
                status,
                error_text
            );
            return Err(ProviderError::Upstream {
                status,
                body: error_text,
            });
        }

        info!(
            "SMS {} code sent to {}",
            message.purpose.as_str(),
            mask_destination(&message.destination)
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "sms-gateway"
    }
}
