//! # Auth Errors
//!
//! Error types for credentials, accounts and password resets.

use thiserror::Error;

use crate::repository::RepositoryError;

/// Result type for auth operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Authentication and account errors
#[derive(Debug, Error)]
pub enum AuthError {
    // ==================
    // Authentication Errors
    // ==================

    /// Unknown email or wrong password (generic, never says which)
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Email or roll already registered
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Account or record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request field missing or malformed
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Password does not meet requirements
    #[error("Password does not meet requirements: {0}")]
    WeakPassword(String),

    /// Caller lacks the role for this operation
    #[error("Not authorized to perform this action")]
    Unauthorized,

    // ==================
    // Session Token Errors
    // ==================

    /// Bad signature, malformed token, or unknown account
    #[error("Invalid session token")]
    InvalidToken,

    /// Signature valid but past expiry
    #[error("Session token expired")]
    ExpiredToken,

    // ==================
    // Reset Token Errors
    // ==================

    /// No live reset token matches the secret
    #[error("Invalid or expired reset token")]
    InvalidOrExpiredToken,

    /// Reset token already consumed
    #[error("Reset token already used")]
    AlreadyUsedToken,

    // ==================
    // Internal Errors
    // ==================

    /// Password hashing failed
    #[error("Internal error: password hashing failed")]
    HashingFailed,

    /// Token generation failed
    #[error("Internal error: token generation failed")]
    TokenGenerationFailed,

    /// Storage operation failed
    #[error("Storage error: {0}")]
    Storage(RepositoryError),
}

impl From<RepositoryError> for AuthError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { bucket, key } => {
                AuthError::NotFound(format!("{}/{}", bucket, key))
            }
            RepositoryError::Conflict(msg) => AuthError::Conflict(msg),
            other => AuthError::Storage(other),
        }
    }
}

impl AuthError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            AuthError::Validation(_) => 400,
            AuthError::WeakPassword(_) => 400,
            AuthError::InvalidOrExpiredToken => 400,
            AuthError::AlreadyUsedToken => 400,

            // 401 Unauthorized
            AuthError::InvalidCredentials => 401,
            AuthError::InvalidToken => 401,
            AuthError::ExpiredToken => 401,

            // 403 Forbidden
            AuthError::Unauthorized => 403,

            // 404 Not Found
            AuthError::NotFound(_) => 404,

            // 409 Conflict
            AuthError::Conflict(_) => 409,

            // 500 Internal Server Error
            AuthError::HashingFailed => 500,
            AuthError::TokenGenerationFailed => 500,
            AuthError::Storage(_) => 500,
        }
    }

    /// Returns whether this error is the caller's fault
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }

    /// Message safe to show to an unauthenticated caller.
    ///
    /// Reset-token failures collapse into one message, and internal
    /// failures never expose their cause.
    pub fn public_message(&self) -> String {
        match self {
            AuthError::InvalidOrExpiredToken | AuthError::AlreadyUsedToken => {
                "Invalid or expired reset token".to_string()
            }
            AuthError::InvalidToken | AuthError::ExpiredToken => {
                "Not authorized, token failed".to_string()
            }
            e if !e.is_client_error() => "Internal server error".to_string(),
            e => e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Bucket;
    use crate::storage::StorageError;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(AuthError::InvalidCredentials.status_code(), 401);
        assert_eq!(AuthError::Unauthorized.status_code(), 403);
        assert_eq!(AuthError::Conflict("email".into()).status_code(), 409);
        assert_eq!(AuthError::HashingFailed.status_code(), 500);
        assert_eq!(AuthError::ExpiredToken.status_code(), 401);
    }

    #[test]
    fn test_error_messages_do_not_leak_info() {
        let err = AuthError::InvalidCredentials;
        assert!(!err.to_string().contains("password"));
        assert!(!err.to_string().contains("email"));
    }

    #[test]
    fn test_reset_failures_share_public_message() {
        assert_eq!(
            AuthError::InvalidOrExpiredToken.public_message(),
            AuthError::AlreadyUsedToken.public_message()
        );
    }

    #[test]
    fn test_storage_failures_are_generic_outward() {
        let err: AuthError = RepositoryError::from(StorageError::commit_failed_no_source("disk full")).into();
        assert!(matches!(err, AuthError::Storage(_)));
        assert_eq!(err.public_message(), "Internal server error");
    }

    #[test]
    fn test_repository_kinds_translate() {
        let err: AuthError = RepositoryError::not_found(Bucket::Users, "abc").into();
        assert!(matches!(err, AuthError::NotFound(_)));

        let err: AuthError = RepositoryError::Conflict("roll".into()).into();
        assert_eq!(err.status_code(), 409);
    }
}
