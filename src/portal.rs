//! Wiring
//!
//! One [`Portal`] owns the store handle and every service built on it. The
//! store is passed explicitly; nothing here is process-global.

use std::sync::Arc;

use crate::auth::{AccountService, CredentialService, HashCost, ResetTokenManager};
use crate::config::Settings;
use crate::issues::IssueService;
use crate::notify::{Dispatcher, LogNotifier, Notifier, OutboxNotifier};
use crate::repository::{DocumentStore, RepositoryResult};

/// All services over one store
#[derive(Clone)]
pub struct Portal {
    pub docs: DocumentStore,
    pub accounts: AccountService,
    pub resets: ResetTokenManager,
    pub issues: IssueService,
    notifications: Dispatcher,
}

impl Portal {
    /// Open the configured store file. Notifications go to the outbox file
    /// when one is configured and to the log otherwise.
    pub fn open(settings: &Settings) -> RepositoryResult<Self> {
        let docs = DocumentStore::open(&settings.database_path)?;
        let notifier: Arc<dyn Notifier> = match &settings.notify_outbox {
            Some(path) => Arc::new(OutboxNotifier::new(path.clone())),
            None => Arc::new(LogNotifier),
        };
        Ok(Self::build(docs, settings, notifier, HashCost::default()))
    }

    /// Assemble services over an already-open store.
    pub fn build(docs: DocumentStore, settings: &Settings, notifier: Arc<dyn Notifier>, cost: HashCost) -> Self {
        let credentials = CredentialService::new(cost, settings.password_policy(), settings.session_config());
        let dispatcher = Dispatcher::new(notifier, settings.frontend_url.clone());

        Self {
            accounts: AccountService::new(docs.clone(), credentials.clone(), dispatcher.clone()),
            resets: ResetTokenManager::new(docs.clone(), credentials, dispatcher.clone(), settings.reset_ttl()),
            issues: IssueService::new(docs.clone(), dispatcher.clone()),
            notifications: dispatcher,
            docs,
        }
    }

    /// Wait for notifications still being sent. Call before process exit.
    pub fn flush_notifications(&self) -> usize {
        self.notifications.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::RegisterRequest;
    use crate::notify::{OutboxEntry, RecordingNotifier};
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_store_file_with_buckets() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings {
            database_path: temp_dir.path().join("nested").join("app.db"),
            ..Settings::default()
        };

        let portal = Portal::open(&settings).unwrap();
        assert!(settings.database_path.exists());
        assert_eq!(portal.docs.engine().stats().buckets.len(), 4);
    }

    #[test]
    fn test_services_share_one_store() {
        let portal = Portal::build(
            DocumentStore::in_memory().unwrap(),
            &Settings::default(),
            Arc::new(RecordingNotifier::new()),
            HashCost::minimal(),
        );

        portal
            .accounts
            .register(RegisterRequest {
                roll: "R1".into(),
                name: "Ada".into(),
                department: "CSE".into(),
                email: "a@x.com".into(),
                password: "secret1".into(),
            })
            .unwrap();

        assert_eq!(portal.issues.admin_stats().unwrap().total_users, 1);
    }

    #[test]
    fn test_open_with_outbox_delivers_reset_link_after_flush() {
        let temp_dir = TempDir::new().unwrap();
        let outbox = temp_dir.path().join("outbox.jsonl");
        let settings = Settings {
            database_path: temp_dir.path().join("app.db"),
            notify_outbox: Some(outbox.clone()),
            frontend_url: "https://portal.example".into(),
            ..Settings::default()
        };

        let portal = Portal::open(&settings).unwrap();
        portal.accounts.seed_admin("admin@x.com", "adminpass").unwrap();
        portal.resets.request_reset("admin@x.com").unwrap();
        portal.flush_notifications();

        let entries: Vec<OutboxEntry> = std::fs::read_to_string(&outbox)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].to, "admin@x.com");
        assert!(entries[0]
            .body
            .contains("https://portal.example/reset-password?token="));
    }
}
