#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use zeroize::Zeroizing;

use tradeport::application::{build_router, AppState, Providers};
use tradeport::auth::{ApiKeyStore, TokenService};
use tradeport::config::AppConfig;
use tradeport::domain::entities::signal::{
    ForwardTestSequence, RetrainAck, RetrainCommand, SignalQuery, SignalSide, TradingSignal,
};
use tradeport::domain::errors::ProviderError;
use tradeport::domain::repositories::notifier::{OtpMessage, OtpSender};
use tradeport::domain::repositories::phone_auth::{PhoneAuthVerifier, VerifiedPhone};
use tradeport::domain::repositories::signal_provider::SignalProvider;
use tradeport::persistence::init_memory_database;

pub const ADMIN_KEY: &str = "adm_k7Qm2xVd9Lr4Tz8Wc1Hn6Bp3Fy5Gs0Ja";
pub const PASSWORD: &str = "correct horse battery";
const JWT_SECRET: &[u8] = b"jwt_k7Qm2xVd9Lr4Tz8Wc1Hn6Bp3Fy5Gs0Ja";

/// Captures every code instead of delivering it.
#[derive(Default, Clone)]
pub struct RecordingSender {
    pub sent: Arc<Mutex<Vec<OtpMessage>>>,
}

#[async_trait]
impl OtpSender for RecordingSender {
    async fn send(&self, message: &OtpMessage) -> Result<(), ProviderError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Accepts tokens shaped `valid:<e164 phone>`.
pub struct StaticPhoneAuth;

#[async_trait]
impl PhoneAuthVerifier for StaticPhoneAuth {
    async fn verify_id_token(&self, id_token: &str) -> Result<VerifiedPhone, ProviderError> {
        match id_token.strip_prefix("valid:") {
            Some(phone) => Ok(VerifiedPhone {
                provider_uid: format!("uid-{}", phone),
                phone_number: phone.to_string(),
            }),
            None => Err(ProviderError::InvalidToken("invalid id token".to_string())),
        }
    }
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap()
}

pub fn forward_test(id: &str, symbol: &str, minutes: i64) -> ForwardTestSequence {
    let at = base_time() + Duration::minutes(minutes);
    ForwardTestSequence {
        sequence_id: id.to_string(),
        symbol: symbol.to_string(),
        timeframe: "15m".to_string(),
        model_version: "v3".to_string(),
        entry_price: 2350.0,
        exit_price: Some(2361.5),
        side: SignalSide::Buy,
        pnl_percent: Some(0.49),
        status: "closed".to_string(),
        opened_at: at,
        closed_at: Some(at + Duration::minutes(30)),
        updated_at: at + Duration::minutes(30),
    }
}

/// In-memory signal service.
#[derive(Default)]
pub struct FakeSignals {
    pub sequences: Vec<ForwardTestSequence>,
    pub retrains: Mutex<Vec<RetrainCommand>>,
    pub unavailable: bool,
}

#[async_trait]
impl SignalProvider for FakeSignals {
    async fn recent_signals(&self, query: &SignalQuery) -> Result<Vec<TradingSignal>, ProviderError> {
        if self.unavailable {
            return Err(ProviderError::Network("connection refused".to_string()));
        }
        let all = ["XAUUSD", "BTCUSDT", "XAUUSD"]
            .iter()
            .enumerate()
            .map(|(i, symbol)| TradingSignal {
                id: format!("sig-{}", i + 1),
                symbol: symbol.to_string(),
                timeframe: "15m".to_string(),
                side: SignalSide::Buy,
                price: 2350.0,
                confidence: 0.8,
                stop_loss: None,
                take_profit: None,
                generated_at: base_time(),
            });
        Ok(all
            .filter(|s| query.symbol.as_deref().map_or(true, |q| q == s.symbol))
            .take(query.limit as usize)
            .collect())
    }

    async fn forward_tests(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ForwardTestSequence>, ProviderError> {
        if self.unavailable {
            return Err(ProviderError::Network("connection refused".to_string()));
        }
        Ok(self
            .sequences
            .iter()
            .filter(|s| since.map_or(true, |t| s.updated_at >= t))
            .cloned()
            .collect())
    }

    async fn request_retrain(&self, command: &RetrainCommand) -> Result<RetrainAck, ProviderError> {
        if self.unavailable {
            return Err(ProviderError::Network("connection refused".to_string()));
        }
        self.retrains.lock().unwrap().push(command.clone());
        Ok(RetrainAck {
            job_id: "job-1".to_string(),
            status: "queued".to_string(),
        })
    }
}

fn build_request(method: &str, uri: &str, bearer: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub fn count_status(statuses: &[StatusCode], wanted: StatusCode) -> usize {
    statuses.iter().filter(|s| **s == wanted).count()
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub sender: RecordingSender,
    pub signals: Arc<FakeSignals>,
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub token: String,
    pub referral_code: String,
}

/// Defaults with a per-IP limit high enough for a whole test, since every
/// oneshot request shares the "unknown" client IP.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.rate_limits.auth_requests_per_minute = 1000;
    config
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with(test_config(), FakeSignals::default()).await
    }

    pub async fn with(config: AppConfig, signals: FakeSignals) -> Self {
        let pool = init_memory_database().await.unwrap();
        let sender = RecordingSender::default();
        let signals = Arc::new(signals);
        let providers = Providers {
            otp_sender: Arc::new(sender.clone()),
            phone_auth: Some(Arc::new(StaticPhoneAuth)),
            signals: signals.clone(),
        };
        let state = AppState::new(
            pool,
            config.clone(),
            TokenService::new(JWT_SECRET, config.jwt_ttl_seconds, config.challenge_ttl_seconds),
            ApiKeyStore::new(vec![Zeroizing::new(ADMIN_KEY.to_string())]),
            providers,
            Zeroizing::new(b"pepper_for_tests_only".to_vec()),
        );

        Self {
            router: build_router(state.clone()),
            state,
            sender,
            signals,
        }
    }

    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let request = build_request(method, uri, bearer, body);
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Fires `count` identical requests at once, each on its own task.
    pub async fn send_concurrently(
        &self,
        count: usize,
        method: &str,
        uri: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> Vec<StatusCode> {
        let handles: Vec<_> = (0..count)
            .map(|_| {
                let router = self.router.clone();
                let request = build_request(method, uri, bearer, body.clone());
                tokio::spawn(async move { router.oneshot(request).await.unwrap().status() })
            })
            .collect();

        let mut statuses = Vec::with_capacity(count);
        for handle in handles {
            statuses.push(handle.await.unwrap());
        }
        statuses
    }

    pub async fn admin(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.send(method, uri, Some(ADMIN_KEY), body).await
    }

    pub async fn register(&self, email: &str, referral_code: Option<&str>) -> TestUser {
        let (status, body) = self
            .send(
                "POST",
                "/api/auth/register",
                None,
                Some(serde_json::json!({
                    "email": email,
                    "password": PASSWORD,
                    "referral_code": referral_code,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);

        TestUser {
            id: body["user"]["id"].as_str().unwrap().to_string(),
            email: body["user"]["email"].as_str().unwrap().to_string(),
            token: body["token"].as_str().unwrap().to_string(),
            referral_code: body["user"]["referral_code"].as_str().unwrap().to_string(),
        }
    }

    /// Most recent code delivered to `destination`.
    pub fn last_code_for(&self, destination: &str) -> String {
        self.sender
            .sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|m| m.destination == destination)
            .map(|m| m.code.clone())
            .expect("no code sent to destination")
    }

    pub async fn verify_phone(&self, user: &TestUser, phone: &str) {
        let (status, body) = self
            .send(
                "POST",
                "/api/verify/phone/firebase",
                Some(&user.token),
                Some(serde_json::json!({ "id_token": format!("valid:{}", phone) })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "phone verification failed: {}", body);
    }

    /// Records a sale by `buyer_id`, paying commission to their upline.
    pub async fn record_sale(&self, buyer_id: &str, amount: i64, source_ref: &str) -> Value {
        let (status, body) = self
            .admin(
                "POST",
                "/api/admin/commissions",
                Some(serde_json::json!({
                    "buyer_id": buyer_id,
                    "amount": amount,
                    "source_ref": source_ref,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "record sale failed: {}", body);
        body
    }
}
