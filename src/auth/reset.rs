//! # Password Reset
//!
//! One-time, short-lived reset tokens. Only the SHA-256 of a secret is
//! stored; the plaintext secret goes to the notifier once and nowhere else.
//!
//! A token is either consumed (terminal) or lapses by time (terminal, never
//! written). Consumption checks the token, overwrites the password and marks
//! the token used inside one write-transaction.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::accounts::find_by_email;
use super::credentials::CredentialService;
use super::crypto::{constant_time_str_eq, generate_token, hash_token};
use super::errors::{AuthError, AuthResult};
use crate::models::{normalize_email, Account, PasswordResetToken};
use crate::notify::{Dispatcher, Notification};
use crate::repository::{Bucket, DocumentStore, Documents};

/// Default reset token lifetime
pub const DEFAULT_RESET_TTL_MINUTES: i64 = 60;

const RESET_ACK_MESSAGE: &str =
    "If an account with that email exists, a password reset link has been sent";

/// Response to a reset request. Identical whether or not the account exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResetAck {
    pub message: String,
}

impl ResetAck {
    fn sent() -> Self {
        Self {
            message: RESET_ACK_MESSAGE.to_string(),
        }
    }
}

/// Issues and consumes password-reset tokens
#[derive(Clone)]
pub struct ResetTokenManager {
    docs: DocumentStore,
    credentials: CredentialService,
    notifier: Dispatcher,
    ttl: Duration,
}

impl ResetTokenManager {
    pub fn new(docs: DocumentStore, credentials: CredentialService, notifier: Dispatcher, ttl: Duration) -> Self {
        Self {
            docs,
            credentials,
            notifier,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Start a reset for `email`.
    pub fn request_reset(&self, email: &str) -> AuthResult<ResetAck> {
        self.request_reset_at(email, Utc::now())
    }

    /// Start a reset for `email` as of `now`.
    ///
    /// An unknown email generates and stores nothing, and gets the same ack.
    pub fn request_reset_at(&self, email: &str, now: DateTime<Utc>) -> AuthResult<ResetAck> {
        let email = normalize_email(email);

        let account = match self.docs.view(|v| find_by_email(v, &email))? {
            Some(account) => account,
            None => {
                tracing::info!("password reset requested for unknown email");
                return Ok(ResetAck::sent());
            }
        };

        let secret = generate_token();
        let record = PasswordResetToken::new(account.id, &account.email, hash_token(&secret), now, self.ttl);
        self.docs.put(Bucket::PasswordResets, &record.key(), &record)?;

        tracing::info!(
            account = %account.id,
            token = %record.id,
            expires_at = %record.expires_at,
            "password reset requested"
        );
        self.notifier.dispatch(
            &account.email,
            Notification::PasswordReset {
                name: account.name,
                secret,
            },
        );

        Ok(ResetAck::sent())
    }

    /// Set a new password using a reset secret.
    pub fn consume_reset(&self, secret: &str, new_password: &str) -> AuthResult<()> {
        self.consume_reset_at(secret, new_password, Utc::now())
    }

    /// Set a new password using a reset secret, judging expiry as of `now`.
    ///
    /// Fails with `AlreadyUsedToken` for a consumed token and
    /// `InvalidOrExpiredToken` for anything else that is not live. On failure
    /// nothing is written.
    pub fn consume_reset_at(&self, secret: &str, new_password: &str, now: DateTime<Utc>) -> AuthResult<()> {
        self.credentials.validate_password(new_password)?;
        let new_hash = self.credentials.hash_password(new_password)?;
        let presented = hash_token(secret.trim());

        let outcome = self.docs.update(|txn| {
            let mut token = match txn.find_one(Bucket::PasswordResets, |t: &PasswordResetToken| {
                constant_time_str_eq(&t.token_hash, &presented)
            }) {
                Ok(token) => token,
                Err(e) if e.is_not_found() => return Err(AuthError::InvalidOrExpiredToken),
                Err(e) => return Err(e.into()),
            };

            if token.used {
                return Err(AuthError::AlreadyUsedToken);
            }
            if token.is_expired_at(now) {
                return Err(AuthError::InvalidOrExpiredToken);
            }

            let mut account: Account = match txn.get(Bucket::Users, &token.user_id.to_string()) {
                Ok(account) => account,
                Err(e) if e.is_not_found() => return Err(AuthError::InvalidOrExpiredToken),
                Err(e) => return Err(e.into()),
            };

            account.password_hash = new_hash;
            txn.put(Bucket::Users, &account.key(), &account)?;

            token.used = true;
            txn.put(Bucket::PasswordResets, &token.key(), &token)?;

            Ok(account)
        });

        let account = match outcome {
            Ok(account) => account,
            Err(e) => {
                if e.is_client_error() {
                    tracing::warn!(reason = %e, "password reset rejected");
                }
                return Err(e);
            }
        };

        tracing::info!(account = %account.id, "password reset completed");
        self.notifier.dispatch(
            &account.email,
            Notification::PasswordChanged { name: account.name },
        );
        Ok(())
    }

    /// Remove used and expired tokens. Returns how many were removed.
    pub fn purge_expired(&self) -> AuthResult<usize> {
        self.purge_expired_at(Utc::now())
    }

    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> AuthResult<usize> {
        let removed = self.docs.update(|txn| {
            let stale = txn.find_all(Bucket::PasswordResets, |t: &PasswordResetToken| !t.is_valid_at(now))?;
            for token in &stale {
                txn.delete(Bucket::PasswordResets, &token.key())?;
            }
            Ok::<_, AuthError>(stale.len())
        })?;

        if removed > 0 {
            tracing::info!(removed, "purged stale reset tokens");
        }
        Ok(removed)
    }
}
