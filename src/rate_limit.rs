use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::{Clock, DefaultClock},
    state::{keyed::DefaultKeyedStateStore, InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::domain::errors::ApiError;

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum requests per minute across all clients
    pub requests_per_minute: u32,
    /// Maximum requests per minute per client IP on auth routes
    pub auth_requests_per_minute: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 600,
            auth_requests_per_minute: 20,
        }
    }
}

pub type GlobalRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;
pub type KeyedRateLimiter = Arc<RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>>;

fn per_minute(requests: u32) -> Quota {
    Quota::per_minute(NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN))
}

pub fn create_rate_limiter(config: &RateLimiterConfig) -> GlobalRateLimiter {
    Arc::new(RateLimiter::direct(per_minute(config.requests_per_minute)))
}

pub fn create_keyed_rate_limiter(config: &RateLimiterConfig) -> KeyedRateLimiter {
    Arc::new(RateLimiter::keyed(per_minute(config.auth_requests_per_minute)))
}

fn retry_after_seconds(wait: std::time::Duration) -> u64 {
    wait.as_secs().max(1)
}

/// Middleware applying the process-wide limit
pub async fn rate_limit_middleware(
    State(limiter): State<GlobalRateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    match limiter.check() {
        Ok(_) => next.run(request).await,
        Err(not_until) => {
            tracing::warn!("Global rate limit exceeded");
            let wait = not_until.wait_time_from(DefaultClock::default().now());
            ApiError::RateLimitExceeded {
                retry_after_seconds: retry_after_seconds(wait),
            }
            .into_response()
        }
    }
}

/// First hop of `X-Forwarded-For`, if present.
pub fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// First `X-Forwarded-For` hop, then the peer address, then `"unknown"`.
pub fn client_ip(request: &Request) -> String {
    if let Some(ip) = forwarded_ip(request.headers()) {
        return ip;
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Middleware applying the per-IP limit on credential endpoints
pub async fn ip_rate_limit_middleware(
    State(limiter): State<KeyedRateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&request);
    match limiter.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(not_until) => {
            tracing::warn!("Auth rate limit exceeded for {}", ip);
            let wait = not_until.wait_time_from(DefaultClock::default().now());
            ApiError::RateLimitExceeded {
                retry_after_seconds: retry_after_seconds(wait),
            }
            .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_rate_limiter_creation() {
        let config = RateLimiterConfig {
            requests_per_minute: 50,
            auth_requests_per_minute: 2,
        };
        let limiter = create_rate_limiter(&config);
        assert!(limiter.check().is_ok());
    }

    #[test]
    fn test_keyed_limiter_is_per_ip() {
        let config = RateLimiterConfig {
            requests_per_minute: 50,
            auth_requests_per_minute: 2,
        };
        let limiter = create_keyed_rate_limiter(&config);
        let a = "10.0.0.1".to_string();
        let b = "10.0.0.2".to_string();

        assert!(limiter.check_key(&a).is_ok());
        assert!(limiter.check_key(&a).is_ok());
        assert!(limiter.check_key(&a).is_err());
        assert!(limiter.check_key(&b).is_ok());
    }

    #[test]
    fn test_client_ip_prefers_forwarded_header() {
        let request = axum::http::Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&request), "203.0.113.7");

        let bare = axum::http::Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_ip(&bare), "unknown");
    }

    #[test]
    fn test_default_config() {
        let config = RateLimiterConfig::default();
        assert_eq!(config.requests_per_minute, 600);
        assert_eq!(config.auth_requests_per_minute, 20);
    }
}
