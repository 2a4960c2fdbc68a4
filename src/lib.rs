//! Tradeport backend library
//!
//! Account security (password login, TOTP two-factor, phone and email
//! verification), multi-level affiliate commissions, withdrawal requests
//! with PromptPay payouts, and a proxy to the trading-signal service.

pub mod application;
pub mod auth;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod persistence;
pub mod rate_limit;
pub mod secrets;
pub mod task_runner;
