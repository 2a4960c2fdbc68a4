//! Firebase phone-auth verification via the Identity Toolkit REST API.
//!
//! The client app signs the user in with Firebase phone auth and sends us the
//! resulting ID token. `accounts:lookup` resolves it to the account, whose
//! `phoneNumber` is the verified number.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::domain::errors::ProviderError;
use crate::domain::repositories::phone_auth::{PhoneAuthVerifier, VerifiedPhone};

const IDENTITY_TOOLKIT_BASE: &str = "https://identitytoolkit.googleapis.com/v1";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
    id_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<FirebaseUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FirebaseUser {
    local_id: String,
    #[serde(default)]
    phone_number: Option<String>,
}

pub struct FirebasePhoneVerifier {
    client: Client,
    base_url: String,
    api_key: Zeroizing<String>,
}

impl FirebasePhoneVerifier {
    pub fn new(api_key: Zeroizing<String>) -> Result<Self, ProviderError> {
        Self::with_base_url(IDENTITY_TOOLKIT_BASE, api_key)
    }

    pub fn with_base_url(base_url: &str, api_key: Zeroizing<String>) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(ProviderError::from)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

fn parse_lookup(body: LookupResponse) -> Result<VerifiedPhone, ProviderError> {
    let user = body
        .users
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::InvalidToken("token matches no account".to_string()))?;

    let phone_number = user
        .phone_number
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            ProviderError::Rejected("Firebase account has no verified phone number".to_string())
        })?;

    Ok(VerifiedPhone {
        provider_uid: user.local_id,
        phone_number,
    })
}

#[async_trait]
impl PhoneAuthVerifier for FirebasePhoneVerifier {
    async fn verify_id_token(&self, id_token: &str) -> Result<VerifiedPhone, ProviderError> {
        if id_token.trim().is_empty() {
            return Err(ProviderError::InvalidToken("empty token".to_string()));
        }

        let url = format!("{}/accounts:lookup", self.base_url);
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&LookupRequest { id_token })
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST {
            // INVALID_ID_TOKEN, TOKEN_EXPIRED and USER_NOT_FOUND all come back as 400
            let error_text = response.text().await.unwrap_or_default();
            debug!("Firebase rejected ID token: {}", error_text);
            return Err(ProviderError::InvalidToken(
                "Firebase rejected the ID token".to_string(),
            ));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!("Firebase lookup failed: {} - {}", status, error_text);
            return Err(ProviderError::Upstream {
                status: status.as_u16(),
                body: error_text,
            });
        }

        let body: LookupResponse = response.json().await?;
        parse_lookup(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lookup_reads_first_user() {
        let body: LookupResponse = serde_json::from_str(
            r#"{"kind":"identitytoolkit#GetAccountInfoResponse",
                "users":[{"localId":"uid-1","phoneNumber":"+66812345678","lastLoginAt":"1"}]}"#,
        )
        .unwrap();
        let verified = parse_lookup(body).unwrap();
        assert_eq!(verified.provider_uid, "uid-1");
        assert_eq!(verified.phone_number, "+66812345678");
    }

    #[test]
    fn test_parse_lookup_without_phone() {
        let body: LookupResponse =
            serde_json::from_str(r#"{"users":[{"localId":"uid-2","email":"a@b.co"}]}"#).unwrap();
        assert!(matches!(parse_lookup(body), Err(ProviderError::Rejected(_))));

        let empty: LookupResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(parse_lookup(empty), Err(ProviderError::InvalidToken(_))));
    }

    #[tokio::test]
    async fn test_empty_token_rejected_locally() {
        let verifier = FirebasePhoneVerifier::new(Zeroizing::new("key".to_string())).unwrap();
        assert!(matches!(
            verifier.verify_id_token("  ").await,
            Err(ProviderError::InvalidToken(_))
        ));
    }
}
