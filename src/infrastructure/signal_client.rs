//! REST client for the trading-signal service.
//!
//! Endpoints, relative to the configured base URL:
//! - `GET  signals/recent?symbol=&limit=`
//! - `GET  forward-tests?since=`
//! - `POST retrain`

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;
use zeroize::Zeroizing;

use crate::domain::entities::signal::{
    ForwardTestSequence, RetrainAck, RetrainCommand, SignalQuery, TradingSignal,
};
use crate::domain::errors::ProviderError;
use crate::domain::repositories::signal_provider::SignalProvider;

pub struct HttpSignalClient {
    client: Client,
    base_url: Url,
    api_key: Option<Zeroizing<String>>,
}

impl HttpSignalClient {
    pub fn new(
        base_url: &str,
        api_key: Option<Zeroizing<String>>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        // Relative joins drop the last path segment unless the base ends in '/'
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized).map_err(|e| {
            ProviderError::NotConfigured(format!("invalid signal service URL: {}", e))
        })?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ProviderError::from)?;

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        self.base_url
            .join(path)
            .map_err(|e| ProviderError::NotConfigured(format!("bad endpoint {}: {}", path, e)))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key.as_str()),
            None => request,
        }
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!("Signal service returned {}: {}", status, error_text);
            return Err(ProviderError::Upstream {
                status: status.as_u16(),
                body: error_text,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

#[async_trait]
impl SignalProvider for HttpSignalClient {
    async fn recent_signals(&self, query: &SignalQuery) -> Result<Vec<TradingSignal>, ProviderError> {
        let mut url = self.endpoint("signals/recent")?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(symbol) = &query.symbol {
                pairs.append_pair("symbol", symbol);
            }
            pairs.append_pair("limit", &query.limit.to_string());
        }

        let response = self.authorize(self.client.get(url)).send().await?;
        Self::read_json(response).await
    }

    async fn forward_tests(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ForwardTestSequence>, ProviderError> {
        let mut url = self.endpoint("forward-tests")?;
        if let Some(since) = since {
            url.query_pairs_mut()
                .append_pair("since", &since.to_rfc3339_opts(SecondsFormat::Millis, true));
        }

        let response = self.authorize(self.client.get(url)).send().await?;
        Self::read_json(response).await
    }

    async fn request_retrain(&self, command: &RetrainCommand) -> Result<RetrainAck, ProviderError> {
        let url = self.endpoint("retrain")?;
        let response = self
            .authorize(self.client.post(url))
            .json(command)
            .send()
            .await?;

        let ack: RetrainAck = Self::read_json(response).await?;
        info!(
            "Retrain requested for {} {}: job {} ({})",
            command.symbol, command.timeframe, ack.job_id, ack.status
        );
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_under_base_path() {
        let client =
            HttpSignalClient::new("http://signals.internal/api/v1", None, Duration::from_secs(5))
                .unwrap();
        assert_eq!(
            client.endpoint("signals/recent").unwrap().as_str(),
            "http://signals.internal/api/v1/signals/recent"
        );
        assert_eq!(
            client.endpoint("retrain").unwrap().as_str(),
            "http://signals.internal/api/v1/retrain"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpSignalClient::new("not a url", None, Duration::from_secs(5)),
            Err(ProviderError::NotConfigured(_))
        ));
    }
}
