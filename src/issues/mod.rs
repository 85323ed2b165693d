//! Issue lifecycle
//!
//! Creation, owner/admin updates, admin deletion, vote toggling and
//! per-user / portal-wide counts. Every read-modify-write runs in one
//! write-transaction; notifications go out after it commits.

mod errors;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use errors::{IssueError, IssueResult};

use crate::models::{Account, Issue, IssueStatus, Priority, VoteOutcome};
use crate::notify::{Dispatcher, Notification};
use crate::repository::{Bucket, DocumentStore, Documents, RepositoryError};

/// Fields for a new issue
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewIssue {
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: Option<Priority>,
    pub image_url: Option<String>,
}

/// Partial update; `None` and blank strings leave a field alone
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<IssueStatus>,
    pub priority: Option<Priority>,
}

/// Counts over one account's issues
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub resolved: usize,
}

/// Portal-wide counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub total_issues: usize,
    pub pending_issues: usize,
    pub resolved_issues: usize,
    pub total_users: usize,
}

#[derive(Clone)]
pub struct IssueService {
    docs: DocumentStore,
    notifier: Dispatcher,
}

impl IssueService {
    pub fn new(docs: DocumentStore, notifier: Dispatcher) -> Self {
        Self { docs, notifier }
    }

    /// File a new pending issue owned by `author`.
    pub fn create(&self, author: &Account, new: NewIssue) -> IssueResult<Issue> {
        if new.title.trim().is_empty() || new.description.trim().is_empty() || new.category.trim().is_empty() {
            return Err(IssueError::Validation(
                "title, description and category are required".to_string(),
            ));
        }

        let image_url = new.image_url.filter(|url| !url.trim().is_empty());
        let issue = Issue::new(
            new.title.trim(),
            new.description.trim(),
            new.category.trim(),
            new.priority.unwrap_or_default(),
            image_url,
            author.id,
        );
        self.docs.put(Bucket::Issues, &issue.key(), &issue)?;

        tracing::info!(issue = %issue.id, owner = %author.id, "issue created");
        self.notifier.dispatch(
            &author.email,
            Notification::IssueSubmitted {
                name: author.name.clone(),
                issue_id: issue.id,
                title: issue.title.clone(),
            },
        );
        Ok(issue)
    }

    pub fn get(&self, id: Uuid) -> IssueResult<Issue> {
        self.docs.view(|v| load(v, id))
    }

    /// Every issue, newest first.
    pub fn list_all(&self) -> IssueResult<Vec<Issue>> {
        let mut issues: Vec<Issue> = self.docs.get_all(Bucket::Issues)?;
        newest_first(&mut issues);
        Ok(issues)
    }

    /// Issues filed by `owner`, newest first.
    pub fn list_by_owner(&self, owner: Uuid) -> IssueResult<Vec<Issue>> {
        let mut issues = self.docs.find_all(Bucket::Issues, |i: &Issue| i.submitted_by == owner)?;
        newest_first(&mut issues);
        Ok(issues)
    }

    /// Apply `update` as `actor`, who must own the issue or be an admin.
    pub fn update(&self, actor: &Account, id: Uuid, update: IssueUpdate) -> IssueResult<Issue> {
        let (issue, old_status) = self.docs.update(|txn| {
            let mut issue = load(&*txn, id)?;
            if !actor.is_admin() && issue.submitted_by != actor.id {
                return Err(IssueError::Forbidden);
            }

            let old_status = issue.status;
            if let Some(title) = non_blank(update.title) {
                issue.title = title;
            }
            if let Some(description) = non_blank(update.description) {
                issue.description = description;
            }
            if let Some(status) = update.status {
                issue.status = status;
            }
            if let Some(priority) = update.priority {
                issue.priority = priority;
            }
            issue.updated_at = Utc::now();

            txn.put(Bucket::Issues, &issue.key(), &issue)?;
            Ok((issue, old_status))
        })?;

        tracing::info!(issue = %id, actor = %actor.id, status = %issue.status, "issue updated");
        if issue.status != old_status {
            self.notify_status_change(&issue, old_status);
        }
        Ok(issue)
    }

    /// Remove an issue. Admins only.
    pub fn delete(&self, actor: &Account, id: Uuid) -> IssueResult<()> {
        if !actor.is_admin() {
            return Err(IssueError::Forbidden);
        }

        self.docs.update(|txn| {
            if !txn.exists(Bucket::Issues, &id.to_string())? {
                return Err(IssueError::NotFound(id));
            }
            txn.delete(Bucket::Issues, &id.to_string())?;
            Ok(())
        })?;

        tracing::info!(issue = %id, actor = %actor.id, "issue deleted");
        Ok(())
    }

    /// Add `voter`'s vote, or withdraw it if already cast.
    pub fn toggle_vote(&self, voter: &Account, id: Uuid) -> IssueResult<(Issue, VoteOutcome)> {
        self.docs.update(|txn| {
            let mut issue = load(&*txn, id)?;
            let outcome = issue.toggle_vote(voter.id);
            txn.put(Bucket::Issues, &issue.key(), &issue)?;
            Ok((issue, outcome))
        })
    }

    pub fn user_stats(&self, owner: Uuid) -> IssueResult<UserStats> {
        self.docs.view(|v| {
            let mine = |status: IssueStatus| {
                v.count_where(Bucket::Issues, move |i: &Issue| {
                    i.submitted_by == owner && i.status == status
                })
            };
            Ok(UserStats {
                total: v.count_where(Bucket::Issues, |i: &Issue| i.submitted_by == owner)?,
                pending: mine(IssueStatus::Pending)?,
                in_progress: mine(IssueStatus::InProgress)?,
                resolved: mine(IssueStatus::Resolved)?,
            })
        })
    }

    pub fn admin_stats(&self) -> IssueResult<AdminStats> {
        self.docs.view(|v| {
            Ok(AdminStats {
                total_issues: v.count(Bucket::Issues)?,
                pending_issues: v.count_where(Bucket::Issues, |i: &Issue| i.status == IssueStatus::Pending)?,
                resolved_issues: v.count_where(Bucket::Issues, |i: &Issue| i.status == IssueStatus::Resolved)?,
                total_users: v.count(Bucket::Users)?,
            })
        })
    }

    fn notify_status_change(&self, issue: &Issue, old_status: IssueStatus) {
        let owner: Account = match self.docs.get(Bucket::Users, &issue.submitted_by.to_string()) {
            Ok(owner) => owner,
            Err(e) => {
                tracing::warn!(issue = %issue.id, error = %e, "issue owner unavailable, status notification skipped");
                return;
            }
        };

        let notification = if issue.status == IssueStatus::Resolved {
            Notification::IssueResolved {
                name: owner.name,
                issue_id: issue.id,
                title: issue.title.clone(),
            }
        } else {
            Notification::IssueStatusUpdate {
                name: owner.name,
                issue_id: issue.id,
                title: issue.title.clone(),
                old_status,
                new_status: issue.status,
            }
        };
        self.notifier.dispatch(&owner.email, notification);
    }
}

fn load<D: Documents + ?Sized>(docs: &D, id: Uuid) -> IssueResult<Issue> {
    docs.get(Bucket::Issues, &id.to_string()).map_err(|e| match e {
        RepositoryError::NotFound { .. } => IssueError::NotFound(id),
        other => IssueError::Storage(other),
    })
}

fn newest_first(issues: &mut [Issue]) {
    issues.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
