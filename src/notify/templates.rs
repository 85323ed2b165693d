//! Message templates
//!
//! Each notification renders to a plain-text subject and body. The reset
//! secret only ever appears inside the rendered body.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use super::errors::NotifyError;
use crate::models::{Account, IssueStatus, Role};

/// Who an administrator broadcast goes to
///
/// Parsed from `all`, `students` or `department:<name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    All,
    /// Accounts with the `user` role
    Students,
    /// Accounts whose department matches, ignoring case
    Department(String),
}

impl Audience {
    pub fn includes(&self, account: &Account) -> bool {
        match self {
            Audience::All => true,
            Audience::Students => account.role == Role::User,
            Audience::Department(name) => account.department.trim().eq_ignore_ascii_case(name),
        }
    }
}

impl FromStr for Audience {
    type Err = NotifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "" | "all" => return Ok(Audience::All),
            "students" => return Ok(Audience::Students),
            _ => {}
        }
        match s.split_once(':') {
            Some((prefix, name)) if prefix.eq_ignore_ascii_case("department") && !name.trim().is_empty() => {
                Ok(Audience::Department(name.trim().to_string()))
            }
            _ => Err(NotifyError::UnknownAudience(s.to_string())),
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Audience::All => f.write_str("all"),
            Audience::Students => f.write_str("students"),
            Audience::Department(name) => write!(f, "department:{}", name),
        }
    }
}

/// Rendered message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub body: String,
}

/// Account and issue lifecycle events that produce a message
#[derive(Debug, Clone)]
pub enum Notification {
    Welcome {
        name: String,
    },
    PasswordReset {
        name: String,
        secret: String,
    },
    PasswordChanged {
        name: String,
    },
    IssueSubmitted {
        name: String,
        issue_id: Uuid,
        title: String,
    },
    IssueStatusUpdate {
        name: String,
        issue_id: Uuid,
        title: String,
        old_status: IssueStatus,
        new_status: IssueStatus,
    },
    IssueResolved {
        name: String,
        issue_id: Uuid,
        title: String,
    },
    Broadcast {
        subject: String,
        body: String,
    },
}

impl Notification {
    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::Welcome { .. } => "welcome",
            Notification::PasswordReset { .. } => "password_reset",
            Notification::PasswordChanged { .. } => "password_changed",
            Notification::IssueSubmitted { .. } => "issue_submitted",
            Notification::IssueStatusUpdate { .. } => "issue_status_update",
            Notification::IssueResolved { .. } => "issue_resolved",
            Notification::Broadcast { .. } => "broadcast",
        }
    }

    /// Render against the portal's public base URL.
    pub fn render(&self, frontend_url: &str) -> Message {
        let base = frontend_url.trim_end_matches('/');
        match self {
            Notification::Welcome { name } => Message {
                subject: "Welcome to the Issue Portal".to_string(),
                body: format!(
                    "Hello {},\n\nYour account is ready. Sign in at {}/login to report and follow issues.\n",
                    name, base
                ),
            },
            Notification::PasswordReset { name, secret } => Message {
                subject: "Password Reset Request".to_string(),
                body: format!(
                    "Hello {},\n\nUse the link below to choose a new password. It expires in one hour and works once.\n\n{}/reset-password?token={}\n\nIf you did not ask for this, ignore this message.\n",
                    name, base, secret
                ),
            },
            Notification::PasswordChanged { name } => Message {
                subject: "Your password was changed".to_string(),
                body: format!(
                    "Hello {},\n\nThe password on your account was just changed. If this was not you, contact an administrator.\n",
                    name
                ),
            },
            Notification::IssueSubmitted { name, issue_id, title } => Message {
                subject: format!("Issue Submitted #{}", short_id(issue_id)),
                body: format!(
                    "Hello {},\n\nWe received your issue \"{}\". Track it at {}/issues/{}.\n",
                    name, title, base, issue_id
                ),
            },
            Notification::IssueStatusUpdate {
                name,
                issue_id,
                title,
                old_status,
                new_status,
            } => Message {
                subject: format!("Issue Update #{}", short_id(issue_id)),
                body: format!(
                    "Hello {},\n\nThe status of \"{}\" changed from {} to {}.\n",
                    name, title, old_status, new_status
                ),
            },
            Notification::IssueResolved { name, issue_id, title } => Message {
                subject: format!("Issue Resolved #{}", short_id(issue_id)),
                body: format!(
                    "Hello {},\n\nYour issue \"{}\" has been resolved. Thank you for reporting it.\n",
                    name, title
                ),
            },
            Notification::Broadcast { subject, body } => Message {
                subject: subject.clone(),
                body: format!("{}\n\n--\nIssue Portal {}\n", body.trim_end(), base),
            },
        }
    }
}

fn short_id(id: &Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}
