//! Admin session tokens (HS256 JWT).
//!
//! The admin panel authenticates once with username and password and then
//! presents a short-lived bearer token on every admin request.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Minimum accepted length of the signing secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Default leeway in seconds for clock skew tolerance.
pub const DEFAULT_LEEWAY_SECS: u64 = 30;

/// Error type for token operations.
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Failed to encode token: {0}")]
    EncodingError(String),

    #[error("Failed to decode token: {0}")]
    DecodingError(String),

    #[error("Token has expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

/// Claims carried by an admin session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminClaims {
    /// Admin ID.
    pub sub: String,
    /// Admin username at the time of login.
    pub username: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    pub scope: TokenScope,
}

/// What a token grants. Only admin sessions exist today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenScope {
    Admin,
}

/// Signs and validates admin session tokens.
#[derive(Clone)]
pub struct AdminTokenConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    pub expiry_secs: i64,
    pub leeway_secs: u64,
}

impl std::fmt::Debug for AdminTokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminTokenConfig")
            .field("expiry_secs", &self.expiry_secs)
            .field("leeway_secs", &self.leeway_secs)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl AdminTokenConfig {
    /// Creates a config from a shared secret.
    pub fn new(secret: &str, expiry_secs: i64) -> Result<Self, JwtError> {
        Self::with_leeway(secret, expiry_secs, DEFAULT_LEEWAY_SECS)
    }

    /// Creates a config from a shared secret with custom clock skew leeway.
    pub fn with_leeway(secret: &str, expiry_secs: i64, leeway_secs: u64) -> Result<Self, JwtError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(JwtError::InvalidKey(format!(
                "secret must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiry_secs,
            leeway_secs,
        })
    }

    /// Issues a session token for an admin. Returns `(token, jti)`.
    pub fn issue(&self, admin_id: Uuid, username: &str) -> Result<(String, String), JwtError> {
        let now = Utc::now();
        let jti = Uuid::new_v4().to_string();

        let claims = AdminClaims {
            sub: admin_id.to_string(),
            username: username.to_string(),
            exp: (now + Duration::seconds(self.expiry_secs)).timestamp(),
            iat: now.timestamp(),
            jti: jti.clone(),
            scope: TokenScope::Admin,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| JwtError::EncodingError(e.to_string()))?;

        Ok((token, jti))
    }

    /// Validates a token and returns its claims.
    pub fn validate(&self, token: &str) -> Result<AdminClaims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = self.leeway_secs;

        let data = decode::<AdminClaims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::TokenExpired,
                jsonwebtoken::errors::ErrorKind::InvalidToken
                | jsonwebtoken::errors::ErrorKind::InvalidSignature => JwtError::InvalidToken,
                _ => JwtError::DecodingError(e.to_string()),
            }
        })?;

        if data.claims.scope != TokenScope::Admin {
            return Err(JwtError::InvalidToken);
        }
        Ok(data.claims)
    }
}

/// Extracts the admin ID from validated claims.
pub fn extract_admin_id(claims: &AdminClaims) -> Result<Uuid, JwtError> {
    Uuid::parse_str(&claims.sub).map_err(|_| JwtError::InvalidToken)
}
