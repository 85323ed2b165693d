//! Credential service: password hashing and session tokens behind one handle.

use std::sync::{Arc, OnceLock};

use uuid::Uuid;

use super::crypto::{hash_password, verify_password, HashCost, PasswordPolicy};
use super::errors::AuthResult;
use super::jwt::{SessionConfig, SessionTokenManager};

/// Password and session-token operations shared by the account services.
#[derive(Clone)]
pub struct CredentialService {
    cost: HashCost,
    policy: PasswordPolicy,
    sessions: SessionTokenManager,
    dummy_hash: Arc<OnceLock<String>>,
}

const DUMMY_PASSWORD: &str = "voiceboard-no-such-account";

impl CredentialService {
    pub fn new(cost: HashCost, policy: PasswordPolicy, session: SessionConfig) -> Self {
        Self {
            cost,
            policy,
            sessions: SessionTokenManager::new(session),
            dummy_hash: Arc::default(),
        }
    }

    pub fn policy(&self) -> &PasswordPolicy {
        &self.policy
    }

    pub fn sessions(&self) -> &SessionTokenManager {
        &self.sessions
    }

    /// Check `password` against the policy
    pub fn validate_password(&self, password: &str) -> AuthResult<()> {
        self.policy.validate(password)
    }

    /// Salted, one-way hash of `plaintext`
    pub fn hash_password(&self, plaintext: &str) -> AuthResult<String> {
        hash_password(plaintext, &self.cost)
    }

    /// False on mismatch and on a malformed hash
    pub fn verify_password(&self, plaintext: &str, hash: &str) -> bool {
        verify_password(plaintext, hash)
    }

    /// Run a full verify against a fixed hash so a lookup miss costs the
    /// same as a wrong password. Always false.
    pub fn verify_unknown_account(&self, plaintext: &str) -> bool {
        let _ = verify_password(plaintext, self.dummy_hash());
        false
    }

    #[cfg(test)]
    pub(crate) fn dummy_hash_built(&self) -> bool {
        self.dummy_hash.get().is_some()
    }

    fn dummy_hash(&self) -> &str {
        self.dummy_hash.get_or_init(|| {
            hash_password(DUMMY_PASSWORD, &self.cost).unwrap_or_else(|e| {
                tracing::error!(error = %e, "could not build dummy password hash");
                String::new()
            })
        })
    }

    pub fn issue_session_token(&self, account_id: Uuid) -> AuthResult<String> {
        self.sessions.issue(account_id)
    }

    /// `InvalidToken` on a bad signature, `ExpiredToken` once lapsed
    pub fn verify_session_token(&self, token: &str) -> AuthResult<Uuid> {
        self.sessions.verify(token)
    }
}
