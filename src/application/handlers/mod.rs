pub mod admin;
pub mod affiliate;
pub mod auth;
pub mod health;
pub mod signal;
pub mod two_factor;
pub mod verification;
pub mod withdrawal;

use axum::extract::ConnectInfo;
use axum::http::HeaderMap;
use std::net::SocketAddr;

use super::state::AppState;
use crate::auth::AuthUser;
use crate::domain::errors::ApiError;
use crate::persistence::models::UserRecord;
use crate::rate_limit::forwarded_ip;

/// Loads the account behind an access token.
///
/// A valid token for a deleted account is treated as unauthenticated.
pub(crate) async fn current_user(state: &AppState, auth: &AuthUser) -> Result<UserRecord, ApiError> {
    state
        .users
        .get(&auth.user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Account no longer exists".to_string()))
}

pub(crate) fn clamp_limit(requested: Option<u32>, default: u32, max: u32) -> u32 {
    requested.unwrap_or(default).clamp(1, max)
}

pub(crate) fn request_ip(
    headers: &HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> Option<String> {
    forwarded_ip(headers).or_else(|| connect_info.map(|ConnectInfo(addr)| addr.ip().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None, 50, 100), 50);
        assert_eq!(clamp_limit(Some(0), 50, 100), 1);
        assert_eq!(clamp_limit(Some(1000), 50, 100), 100);
    }

    #[test]
    fn test_request_ip_prefers_forwarded() {
        let mut headers = HeaderMap::new();
        let peer = Some(ConnectInfo(SocketAddr::from(([10, 0, 0, 2], 4000))));
        assert_eq!(request_ip(&headers, peer), Some("10.0.0.2".to_string()));

        headers.insert("x-forwarded-for", "198.51.100.4".parse().unwrap());
        assert_eq!(request_ip(&headers, peer), Some("198.51.100.4".to_string()));
        assert_eq!(request_ip(&HeaderMap::new(), None), None);
    }
}
