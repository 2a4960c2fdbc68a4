use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zeroize::Zeroizing;

use tradeport::application::services::forward_test_sync::sync_forward_tests;
use tradeport::application::services::otp_cleanup::purge_stale_otps;
use tradeport::application::{build_router, AppState, Providers};
use tradeport::auth::{ApiKeyStore, TokenService};
use tradeport::config::AppConfig;
use tradeport::domain::repositories::notifier::OtpSender;
use tradeport::domain::repositories::phone_auth::PhoneAuthVerifier;
use tradeport::infrastructure::email_gateway::EmailGatewayClient;
use tradeport::infrastructure::firebase_client::FirebasePhoneVerifier;
use tradeport::infrastructure::otp_dispatch::{CompositeOtpSender, LogOnlySender};
use tradeport::infrastructure::signal_client::HttpSignalClient;
use tradeport::infrastructure::sms_gateway::SmsGatewayClient;
use tradeport::persistence::{init_database, DatabaseConfig};
use tradeport::secrets::{
    load_api_keys, load_optional_secret, load_signing_secret, SecretConfig,
};
use tradeport::task_runner::{run_with_backoff, BackoffConfig};

const OTP_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tradeport=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Tradeport server starting...");

    let config = AppConfig::from_env();
    let db_config = DatabaseConfig::from_env();
    let pool = init_database(&db_config).await?;

    let secret_config = SecretConfig::from_env();
    let jwt_secret = load_signing_secret("JWT_SECRET", &secret_config)?;
    let otp_pepper = load_signing_secret("OTP_PEPPER", &secret_config)?;
    let admin_keys = load_api_keys("ADMIN_API_KEYS", &secret_config)?;
    info!("✓ Secrets loaded");

    let tokens = TokenService::new(
        jwt_secret.as_bytes(),
        config.jwt_ttl_seconds,
        config.challenge_ttl_seconds,
    );
    let api_keys = ApiKeyStore::new(admin_keys);

    let providers = build_providers(&config, &secret_config)?;
    let otp_pepper = Zeroizing::new(otp_pepper.as_bytes().to_vec());

    let state = AppState::new(pool, config.clone(), tokens, api_keys, providers, otp_pepper);

    if config.signal_sync_interval_seconds > 0 {
        let signals = state.providers.signals.clone();
        let repo = state.forward_tests.clone();
        let backoff = BackoffConfig {
            interval: Duration::from_secs(config.signal_sync_interval_seconds),
            ..BackoffConfig::default()
        };
        tokio::spawn(async move {
            run_with_backoff("forward_test_sync", backoff, || {
                let signals = signals.clone();
                let repo = repo.clone();
                async move {
                    sync_forward_tests(signals.as_ref(), &repo)
                        .await
                        .map(|_| ())
                        .map_err(|e| e.to_string())
                }
            })
            .await;
        });
    } else {
        warn!("Forward-test sync disabled (SIGNAL_SYNC_INTERVAL_SECONDS=0)");
    }

    {
        let otps = state.otps.clone();
        let policy = config.otp.clone();
        let backoff = BackoffConfig {
            interval: OTP_CLEANUP_INTERVAL,
            ..BackoffConfig::default()
        };
        tokio::spawn(async move {
            run_with_backoff("otp_cleanup", backoff, || {
                let otps = otps.clone();
                let policy = policy.clone();
                async move {
                    purge_stale_otps(&otps, &policy)
                        .await
                        .map(|_| ())
                        .map_err(|e| e.to_string())
                }
            })
            .await;
        });
    }

    let app = build_router(state);

    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("✓ Listening on {}", addr);

    let shutdown_signal = async {
        let ctrl_c = async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C signal"),
                Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                    info!("Received SIGTERM signal");
                }
                Err(e) => error!("Failed to install SIGTERM handler: {}", e),
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    };

    info!("Server started successfully. Press Ctrl+C to stop.");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await?;

    info!("Shutdown complete");
    Ok(())
}

/// Wires the provider adapters, falling back to log-only delivery for
/// channels without a configured gateway.
fn build_providers(
    config: &AppConfig,
    secrets: &SecretConfig,
) -> Result<Providers, Box<dyn std::error::Error>> {
    let sms: Arc<dyn OtpSender> = match (
        config.sms_gateway_url.as_deref(),
        load_optional_secret("SMS_GATEWAY_API_KEY", secrets)?,
    ) {
        (Some(url), Some(key)) => {
            info!("✓ SMS gateway configured");
            Arc::new(SmsGatewayClient::new(
                url,
                key,
                &config.sms_sender,
                &config.brand_name,
            )?)
        }
        _ => {
            warn!("SMS gateway not configured, codes will only be logged");
            Arc::new(LogOnlySender)
        }
    };

    let email: Arc<dyn OtpSender> = match (
        config.email_gateway_url.as_deref(),
        load_optional_secret("EMAIL_GATEWAY_API_KEY", secrets)?,
    ) {
        (Some(url), Some(key)) => {
            info!("✓ Email gateway configured");
            Arc::new(EmailGatewayClient::new(
                url,
                key,
                &config.email_from,
                &config.brand_name,
            )?)
        }
        _ => {
            warn!("Email gateway not configured, codes will only be logged");
            Arc::new(LogOnlySender)
        }
    };

    let phone_auth: Option<Arc<dyn PhoneAuthVerifier>> =
        match load_optional_secret("FIREBASE_API_KEY", secrets)? {
            Some(key) => {
                info!("✓ Firebase phone verification enabled");
                Some(Arc::new(FirebasePhoneVerifier::new(key)?))
            }
            None => None,
        };

    let signals = HttpSignalClient::new(
        &config.signal_service_url,
        load_optional_secret("SIGNAL_SERVICE_API_KEY", secrets)?,
        Duration::from_secs(config.signal_timeout_seconds),
    )?;
    info!("✓ Signal service at {}", config.signal_service_url);

    Ok(Providers {
        otp_sender: Arc::new(CompositeOtpSender::new(sms, email)),
        phone_auth,
        signals: Arc::new(signals),
    })
}
