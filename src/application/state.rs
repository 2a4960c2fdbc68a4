use std::sync::Arc;
use zeroize::Zeroizing;

use crate::auth::{ApiKeyStore, TokenService};
use crate::config::AppConfig;
use crate::domain::repositories::notifier::OtpSender;
use crate::domain::repositories::phone_auth::PhoneAuthVerifier;
use crate::domain::repositories::signal_provider::SignalProvider;
use crate::persistence::affiliate_repository::AffiliateRepository;
use crate::persistence::device_repository::DeviceRepository;
use crate::persistence::forward_test_repository::ForwardTestRepository;
use crate::persistence::otp_repository::OtpRepository;
use crate::persistence::user_repository::UserRepository;
use crate::persistence::withdrawal_repository::WithdrawalRepository;
use crate::persistence::DbPool;

/// External integrations behind their port traits
#[derive(Clone)]
pub struct Providers {
    pub otp_sender: Arc<dyn OtpSender>,
    /// `None` when no Firebase key is configured
    pub phone_auth: Option<Arc<dyn PhoneAuthVerifier>>,
    pub signals: Arc<dyn SignalProvider>,
}

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub users: UserRepository,
    pub otps: OtpRepository,
    pub devices: DeviceRepository,
    pub affiliates: AffiliateRepository,
    pub withdrawals: WithdrawalRepository,
    pub forward_tests: ForwardTestRepository,
    pub tokens: Arc<TokenService>,
    pub api_keys: Arc<ApiKeyStore>,
    pub providers: Providers,
    pub config: Arc<AppConfig>,
    /// HMAC key for stored OTP hashes
    pub otp_pepper: Arc<Zeroizing<Vec<u8>>>,
}

impl AppState {
    pub fn new(
        pool: DbPool,
        config: AppConfig,
        tokens: TokenService,
        api_keys: ApiKeyStore,
        providers: Providers,
        otp_pepper: Zeroizing<Vec<u8>>,
    ) -> Self {
        Self {
            users: UserRepository::new(pool.clone()),
            otps: OtpRepository::new(pool.clone()),
            devices: DeviceRepository::new(pool.clone()),
            affiliates: AffiliateRepository::new(pool.clone()),
            withdrawals: WithdrawalRepository::new(pool.clone()),
            forward_tests: ForwardTestRepository::new(pool.clone()),
            pool,
            tokens: Arc::new(tokens),
            api_keys: Arc::new(api_keys),
            providers,
            config: Arc::new(config),
            otp_pepper: Arc::new(otp_pepper),
        }
    }
}
