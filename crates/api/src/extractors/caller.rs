//! Anonymous caller fingerprint extractor.
//!
//! The client address is taken from the first `X-Forwarded-For` entry, then
//! `X-Real-IP`, then the socket peer. It is hashed immediately; the raw
//! address is never stored.

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, Extensions, HeaderMap},
};
use axum_extra::headers::{HeaderMapExt, UserAgent};
use domain::models::CallerIdentity;
use shared::crypto::hash_ip;
use std::convert::Infallible;
use std::net::SocketAddr;

use crate::app::AppState;
use crate::config::SecurityConfig;

pub const FORWARDED_FOR_HEADER: &str = "X-Forwarded-For";
pub const REAL_IP_HEADER: &str = "X-Real-IP";

/// Address used when no source yields one.
const UNKNOWN_ADDRESS: &str = "unknown";

/// Resolves the client address from proxy headers or the socket peer.
pub fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> String {
    let forwarded = headers
        .get(FORWARDED_FOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get(REAL_IP_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string())
}

/// Builds the caller identity for a request.
pub fn identify_caller(
    headers: &HeaderMap,
    extensions: &Extensions,
    security: &SecurityConfig,
) -> CallerIdentity {
    let ip = client_ip(headers, extensions);
    let user_agent = headers
        .typed_get::<UserAgent>()
        .map(|ua| ua.as_str().to_string());

    CallerIdentity::new(hash_ip(&ip, &security.ip_hash_secret), user_agent)
}

/// Caller identity for public routes.
#[derive(Debug, Clone)]
pub struct Caller(pub CallerIdentity);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Rate limiting middleware may have resolved it already
        if let Some(caller) = parts.extensions.get::<CallerIdentity>() {
            return Ok(Caller(caller.clone()));
        }

        Ok(Caller(identify_caller(
            &parts.headers,
            &parts.extensions,
            &state.config.security,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn security() -> SecurityConfig {
        SecurityConfig {
            cors_origins: vec![],
            rate_limit_per_minute: 0,
            ip_hash_secret: "test-secret".to_string(),
        }
    }

    #[test]
    fn test_forwarded_for_first_entry_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(
            FORWARDED_FOR_HEADER,
            HeaderValue::from_static(" 203.0.113.7 , 10.0.0.1"),
        );
        headers.insert(REAL_IP_HEADER, HeaderValue::from_static("198.51.100.2"));

        assert_eq!(client_ip(&headers, &Extensions::new()), "203.0.113.7");
    }

    #[test]
    fn test_real_ip_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(REAL_IP_HEADER, HeaderValue::from_static("198.51.100.2"));

        assert_eq!(client_ip(&headers, &Extensions::new()), "198.51.100.2");
    }

    #[test]
    fn test_connect_info_fallback() {
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 4242))));

        assert_eq!(client_ip(&HeaderMap::new(), &extensions), "192.0.2.1");
    }

    #[test]
    fn test_unknown_when_no_source() {
        assert_eq!(client_ip(&HeaderMap::new(), &Extensions::new()), "unknown");
    }

    #[test]
    fn test_identity_hashes_address() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR_HEADER, HeaderValue::from_static("203.0.113.7"));
        headers.insert("User-Agent", HeaderValue::from_static("test-agent/1.0"));

        let caller = identify_caller(&headers, &Extensions::new(), &security());
        assert_eq!(caller.ip_hash, hash_ip("203.0.113.7", "test-secret"));
        assert!(!caller.ip_hash.contains("203.0.113.7"));
        assert_eq!(caller.user_agent.as_deref(), Some("test-agent/1.0"));
    }

    #[test]
    fn test_missing_user_agent() {
        let caller = identify_caller(&HeaderMap::new(), &Extensions::new(), &security());
        assert!(caller.user_agent.is_none());
    }
}
