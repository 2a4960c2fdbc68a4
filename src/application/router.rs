//! Route table.
//!
//! - `/health` is public.
//! - `/api/auth/{register,login,login/2fa}` are public and limited per client IP.
//! - other `/api/*` routes require a user access token.
//! - `/api/admin/*` requires an admin API key.
//!
//! Every route shares the global rate limit and the request body cap.

use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use super::handlers::{
    admin, affiliate, auth, health, signal, two_factor, verification, withdrawal,
};
use super::state::AppState;
use crate::auth::{require_api_key, require_user};
use crate::rate_limit::{
    create_keyed_rate_limiter, create_rate_limiter, ip_rate_limit_middleware,
    rate_limit_middleware,
};

const MAX_BODY_BYTES: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let global_limiter = create_rate_limiter(&state.config.rate_limits);
    let ip_limiter = create_keyed_rate_limiter(&state.config.rate_limits);

    let credentials = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/login/2fa", post(auth::login_two_factor))
        .route_layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware));

    let user = Router::new()
        .route("/api/auth/status", get(auth::status))
        .route("/api/auth/devices", get(auth::list_devices))
        .route("/api/auth/devices/:id", delete(auth::revoke_device))
        .route("/api/auth/2fa/setup", post(two_factor::setup))
        .route("/api/auth/2fa/enable", post(two_factor::enable))
        .route("/api/auth/2fa/disable", post(two_factor::disable))
        .route("/api/auth/2fa/status", get(two_factor::status))
        .route(
            "/api/verify/phone/request",
            post(verification::request_phone_code),
        )
        .route("/api/verify/phone/confirm", post(verification::confirm_phone))
        .route(
            "/api/verify/phone/firebase",
            post(verification::confirm_phone_firebase),
        )
        .route(
            "/api/verify/email/request",
            post(verification::request_email_code),
        )
        .route("/api/verify/email/confirm", post(verification::confirm_email))
        .route("/api/affiliate/summary", get(affiliate::summary))
        .route("/api/affiliate/referrals", get(affiliate::referrals))
        .route("/api/affiliate/commissions", get(affiliate::commissions))
        .route(
            "/api/withdrawals",
            post(withdrawal::create).get(withdrawal::list),
        )
        .route("/api/signals/recent", get(signal::recent))
        .route("/api/signals/forward-tests", get(signal::forward_tests))
        .route_layer(from_fn_with_state(state.tokens.clone(), require_user));

    let admin = Router::new()
        .route("/api/admin/signals/retrain", post(admin::retrain))
        .route("/api/admin/commissions", post(admin::record_commission))
        .route("/api/admin/withdrawals", get(admin::list_withdrawals))
        .route(
            "/api/admin/withdrawals/:id/approve",
            post(admin::approve_withdrawal),
        )
        .route(
            "/api/admin/withdrawals/:id/reject",
            post(admin::reject_withdrawal),
        )
        .route(
            "/api/admin/withdrawals/:id/paid",
            post(admin::mark_withdrawal_paid),
        )
        .route_layer(from_fn_with_state(state.api_keys.clone(), require_api_key));

    Router::new()
        .route("/health", get(health::health_check))
        .merge(credentials)
        .merge(user)
        .merge(admin)
        .with_state(state)
        .layer(from_fn_with_state(global_limiter, rate_limit_middleware))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
}
