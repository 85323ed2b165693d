//! # Session Tokens
//!
//! HS256 JSON Web Tokens carrying the account id, issue time and expiry.
//! Validation is stateless: signature and expiry only, no lookup and no
//! revocation list.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{AuthError, AuthResult};

/// Development fallback secret. Never acceptable in production.
pub const INSECURE_DEFAULT_SECRET: &str = "default_secret_key_change_this";

/// Default session lifetime
pub const DEFAULT_SESSION_TTL_DAYS: i64 = 30;

/// JWT claims for session tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Account id
    pub id: String,

    /// Issued at (Unix epoch seconds)
    pub iat: i64,

    /// Expiration (Unix epoch seconds)
    pub exp: i64,
}

/// Session token configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// HMAC secret
    pub secret: String,

    /// Token lifetime
    pub ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: INSECURE_DEFAULT_SECRET.to_string(),
            ttl: Duration::days(DEFAULT_SESSION_TTL_DAYS),
        }
    }
}

impl SessionConfig {
    /// Config with `secret`, falling back to the insecure default when absent or blank.
    pub fn with_secret(secret: Option<&str>, ttl: Duration) -> Self {
        let secret = match secret.map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => INSECURE_DEFAULT_SECRET.to_string(),
        };
        Self { secret, ttl }
    }

    /// Whether the signing secret is the well-known fallback
    pub fn is_insecure(&self) -> bool {
        self.secret == INSECURE_DEFAULT_SECRET
    }
}

/// Issues and verifies session tokens
#[derive(Clone)]
pub struct SessionTokenManager {
    config: SessionConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl SessionTokenManager {
    /// Create a manager. Warns when running on the fallback secret.
    pub fn new(config: SessionConfig) -> Self {
        if config.is_insecure() {
            tracing::warn!("session tokens are signed with the insecure default secret; set JWT_SECRET");
        }

        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            config,
            encoding_key,
            decoding_key,
            validation,
        }
    }

    pub fn is_insecure(&self) -> bool {
        self.config.is_insecure()
    }

    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }

    /// Issue a token for `account_id`, valid from now for the configured lifetime.
    pub fn issue(&self, account_id: Uuid) -> AuthResult<String> {
        self.issue_at(account_id, Utc::now())
    }

    /// Issue a token as if it had been created at `issued_at`.
    pub fn issue_at(&self, account_id: Uuid, issued_at: DateTime<Utc>) -> AuthResult<String> {
        let expires_at = issued_at.checked_add_signed(self.config.ttl).ok_or_else(|| {
            tracing::error!(ttl_seconds = self.config.ttl.num_seconds(), "session expiry out of range");
            AuthError::TokenGenerationFailed
        })?;
        let claims = SessionClaims {
            id: account_id.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|_| AuthError::TokenGenerationFailed)
    }

    /// Validate a token and extract its claims
    pub fn verify_claims(&self, token: &str) -> AuthResult<SessionClaims> {
        decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                kind => {
                    tracing::debug!(error = ?kind, "session token rejected");
                    AuthError::InvalidToken
                }
            })
    }

    /// Validate a token and return the account id it names
    pub fn verify(&self, token: &str) -> AuthResult<Uuid> {
        let claims = self.verify_claims(token)?;
        Uuid::parse_str(&claims.id).map_err(|_| AuthError::InvalidToken)
    }
}
