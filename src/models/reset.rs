//! Password-reset token records
//!
//! Only the hash of the secret is stored. A record is live until it is
//! consumed or its expiry passes; neither transition is ever undone.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stored reset token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PasswordResetToken {
    pub id: Uuid,
    pub user_id: Uuid,

    /// One-way hash of the secret
    pub token_hash: String,

    /// Copy of the account email, for diagnostics only
    pub email: String,

    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl PasswordResetToken {
    /// New unused token expiring `ttl` after `now`, clamped to the latest
    /// representable instant.
    pub fn new(user_id: Uuid, email: &str, token_hash: String, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            token_hash,
            email: email.to_string(),
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            used: false,
            created_at: now,
        }
    }

    pub fn key(&self) -> String {
        self.id.to_string()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Usable iff not consumed and `now < expires_at`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.used && !self.is_expired_at(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity_window() {
        let now = Utc::now();
        let token = PasswordResetToken::new(Uuid::new_v4(), "a@x.com", "h".into(), now, Duration::hours(1));

        assert!(token.is_valid_at(now));
        assert!(token.is_valid_at(now + Duration::minutes(59)));
        assert!(!token.is_valid_at(now + Duration::hours(1)));
    }

    #[test]
    fn test_used_token_is_never_valid() {
        let now = Utc::now();
        let mut token = PasswordResetToken::new(Uuid::new_v4(), "a@x.com", "h".into(), now, Duration::hours(1));
        token.used = true;
        assert!(!token.is_valid_at(now));
        assert!(!token.is_expired_at(now));
    }
}
