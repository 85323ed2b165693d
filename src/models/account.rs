//! # Accounts
//!
//! Accounts are stored in the `users` bucket keyed by id. The password hash
//! is part of the stored record; anything shown to a caller goes through
//! [`AccountProfile`], which has no hash field at all.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored account record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Unique account identifier
    #[serde(rename = "_id")]
    pub id: Uuid,

    /// Secondary human identifier (unique)
    pub roll: String,

    /// Display name
    pub name: String,

    /// Organizational unit
    pub department: String,

    /// Login email (unique, stored normalized)
    pub email: String,

    /// Argon2id PHC string (never plaintext)
    pub password_hash: String,

    pub role: Role,

    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Build a new account with a fresh id. `email` is normalized.
    pub fn new(
        roll: impl Into<String>,
        name: impl Into<String>,
        department: impl Into<String>,
        email: &str,
        password_hash: String,
        role: Role,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            roll: roll.into().trim().to_string(),
            name: name.into().trim().to_string(),
            department: department.into().trim().to_string(),
            email: normalize_email(email),
            password_hash,
            role,
            created_at: Utc::now(),
        }
    }

    /// Storage key
    pub fn key(&self) -> String {
        self.id.to_string()
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Whether `email` names this account, ignoring case and surrounding space
    pub fn has_email(&self, email: &str) -> bool {
        self.email == normalize_email(email)
    }

    /// Outward representation without the password hash
    pub fn profile(&self) -> AccountProfile {
        AccountProfile {
            id: self.id,
            roll: self.roll.clone(),
            name: self.name.clone(),
            department: self.department.clone(),
            email: self.email.clone(),
            role: self.role,
            created_at: self.created_at,
        }
    }
}

/// Account as shown to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountProfile {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub roll: String,
    pub name: String,
    pub department: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Canonical form used for storage and comparison
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
