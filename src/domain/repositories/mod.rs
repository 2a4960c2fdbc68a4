pub mod notifier;
pub mod phone_auth;
pub mod signal_provider;
