//! Persisted records and their outward views

mod account;
mod issue;
mod reset;

pub use account::{normalize_email, Account, AccountProfile, Role};
pub use issue::{Issue, IssueStatus, Priority, VoteOutcome};
pub use reset::PasswordResetToken;
