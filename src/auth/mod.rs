//! # Auth Module
//!
//! Password hashing, session tokens, account lifecycle and one-time
//! password-reset tokens, all persisted through the document repository.

pub mod accounts;
pub mod credentials;
pub mod crypto;
pub mod errors;
pub mod jwt;
pub mod reset;

pub use accounts::{AccountService, AuthSession, ProfileUpdate, RegisterRequest, SeedOutcome, ADMIN_ROLL};
pub use credentials::CredentialService;
pub use crypto::{HashCost, PasswordPolicy};
pub use errors::{AuthError, AuthResult};
pub use jwt::{SessionClaims, SessionConfig, SessionTokenManager, INSECURE_DEFAULT_SECRET};
pub use reset::{ResetAck, ResetTokenManager, DEFAULT_RESET_TTL_MINUTES};
