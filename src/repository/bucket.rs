//! Bucket names known to the application

use std::fmt;

/// A named partition of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Bucket {
    /// Accounts keyed by id
    Users,
    /// Issues keyed by id
    Issues,
    /// Issue comments keyed by id
    Comments,
    /// Password-reset tokens keyed by id
    PasswordResets,
}

impl Bucket {
    /// Every bucket; created at startup.
    pub const ALL: [Bucket; 4] = [
        Bucket::Users,
        Bucket::Issues,
        Bucket::Comments,
        Bucket::PasswordResets,
    ];

    /// On-disk bucket name
    pub fn name(&self) -> &'static str {
        match self {
            Bucket::Users => "users",
            Bucket::Issues => "issues",
            Bucket::Comments => "comments",
            Bucket::PasswordResets => "password_resets",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl AsRef<str> for Bucket {
    fn as_ref(&self) -> &str {
        self.name()
    }
}
