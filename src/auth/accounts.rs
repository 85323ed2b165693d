//! # Account Lifecycle
//!
//! Registration, login, session authentication and profile changes.
//!
//! Email and roll uniqueness is checked inside the same write-transaction as
//! the insert, so two concurrent registrations for one email cannot both
//! commit.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::credentials::CredentialService;
use super::errors::{AuthError, AuthResult};
use crate::models::{normalize_email, Account, AccountProfile, Role};
use crate::notify::{Audience, Dispatcher, Notification};
use crate::repository::{Bucket, DocumentStore, Documents};

/// Roll given to seeded administrators
pub const ADMIN_ROLL: &str = "ADMIN";

/// Self-service signup
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub roll: String,
    pub name: String,
    pub department: String,
    pub email: String,
    pub password: String,
}

impl RegisterRequest {
    fn validate(&self) -> AuthResult<()> {
        let fields = [
            ("roll", &self.roll),
            ("name", &self.name),
            ("department", &self.department),
            ("email", &self.email),
        ];
        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(AuthError::Validation(format!("{} is required", field)));
            }
        }
        validate_email(&self.email)
    }
}

/// Profile fields a user may change. Blank values are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub department: Option<String>,
}

/// Signed-in account and its session token
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub token: String,
    pub account: AccountProfile,
}

/// Result of [`AccountService::seed_admin`]
#[derive(Debug, Clone, PartialEq)]
pub enum SeedOutcome {
    Created(AccountProfile),
    AlreadyExists(AccountProfile),
}

/// Account operations over the document store
#[derive(Clone)]
pub struct AccountService {
    docs: DocumentStore,
    credentials: CredentialService,
    notifier: Dispatcher,
}

impl AccountService {
    pub fn new(docs: DocumentStore, credentials: CredentialService, notifier: Dispatcher) -> Self {
        Self {
            docs,
            credentials,
            notifier,
        }
    }

    pub fn credentials(&self) -> &CredentialService {
        &self.credentials
    }

    /// Create a `user` account and sign it in.
    ///
    /// Fails with `Conflict` before any write if the email or roll is taken.
    pub fn register(&self, request: RegisterRequest) -> AuthResult<AuthSession> {
        request.validate()?;
        self.credentials.validate_password(&request.password)?;

        let hash = self.credentials.hash_password(&request.password)?;
        let account = Account::new(
            request.roll,
            request.name,
            request.department,
            &request.email,
            hash,
            Role::User,
        );

        self.docs.update(|txn| {
            ensure_unique(&*txn, &account.email, &account.roll)?;
            txn.put(Bucket::Users, &account.key(), &account)?;
            Ok::<_, AuthError>(())
        })?;

        tracing::info!(account = %account.id, "account registered");
        self.notifier.dispatch(
            &account.email,
            Notification::Welcome {
                name: account.name.clone(),
            },
        );

        let token = self.credentials.issue_session_token(account.id)?;
        Ok(AuthSession {
            token,
            account: account.profile(),
        })
    }

    /// Exchange email and password for a session.
    pub fn login(&self, email: &str, password: &str) -> AuthResult<AuthSession> {
        let email = normalize_email(email);
        let account = match self.docs.view(|v| find_by_email(v, &email))? {
            Some(account) => account,
            None => {
                self.credentials.verify_unknown_account(password);
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !self.credentials.verify_password(password, &account.password_hash) {
            tracing::warn!(account = %account.id, "login rejected");
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.credentials.issue_session_token(account.id)?;
        Ok(AuthSession {
            token,
            account: account.profile(),
        })
    }

    /// Resolve a session token to its account.
    pub fn authenticate(&self, token: &str) -> AuthResult<Account> {
        let id = self.credentials.verify_session_token(token)?;
        match self.docs.get(Bucket::Users, &id.to_string()) {
            Ok(account) => Ok(account),
            Err(e) if e.is_not_found() => {
                tracing::warn!(account = %id, "session token names a missing account");
                Err(AuthError::InvalidToken)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Account registered under `email`, if any.
    pub fn account_by_email(&self, email: &str) -> AuthResult<Option<Account>> {
        let email = normalize_email(email);
        self.docs.view(|v| find_by_email(v, &email))
    }

    pub fn require_admin(&self, account: &Account) -> AuthResult<()> {
        if account.is_admin() {
            Ok(())
        } else {
            Err(AuthError::Unauthorized)
        }
    }

    /// Queue `subject`/`body` to every account in `audience`.
    ///
    /// Admin only. Returns how many messages were queued; delivery happens in
    /// the background and failures are only logged.
    pub fn broadcast(&self, actor: &Account, audience: &Audience, subject: &str, body: &str) -> AuthResult<usize> {
        self.require_admin(actor)?;
        if subject.trim().is_empty() || body.trim().is_empty() {
            return Err(AuthError::Validation("subject and body are required".to_string()));
        }

        let recipients: Vec<Account> = self.docs.find_all(Bucket::Users, |a: &Account| audience.includes(a))?;
        for recipient in &recipients {
            self.notifier.dispatch(
                &recipient.email,
                Notification::Broadcast {
                    subject: subject.to_string(),
                    body: body.to_string(),
                },
            );
        }

        tracing::info!(actor = %actor.id, %audience, queued = recipients.len(), "broadcast queued");
        Ok(recipients.len())
    }

    pub fn profile(&self, id: Uuid) -> AuthResult<AccountProfile> {
        let account: Account = self.docs.get(Bucket::Users, &id.to_string())?;
        Ok(account.profile())
    }

    pub fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> AuthResult<AccountProfile> {
        let profile = self.docs.modify(Bucket::Users, &id.to_string(), |account: &mut Account| {
            if let Some(name) = non_blank(update.name.as_deref()) {
                account.name = name;
            }
            if let Some(department) = non_blank(update.department.as_deref()) {
                account.department = department;
            }
            Ok(account.profile())
        })?;
        Ok(profile)
    }

    /// Replace the password after checking the current one.
    pub fn change_password(&self, id: Uuid, current: &str, new_password: &str) -> AuthResult<()> {
        self.credentials.validate_password(new_password)?;

        let account: Account = self.docs.get(Bucket::Users, &id.to_string())?;
        if !self.credentials.verify_password(current, &account.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }

        let hash = self.credentials.hash_password(new_password)?;
        self.docs.modify(Bucket::Users, &account.key(), |stored: &mut Account| {
            stored.password_hash = hash;
            Ok(())
        })?;

        tracing::info!(account = %id, "password changed");
        self.notifier.dispatch(
            &account.email,
            Notification::PasswordChanged { name: account.name },
        );
        Ok(())
    }

    /// Create the administrator account unless one with `email` exists.
    pub fn seed_admin(&self, email: &str, password: &str) -> AuthResult<SeedOutcome> {
        validate_email(email)?;
        let email = normalize_email(email);

        if let Some(existing) = self.docs.view(|v| find_by_email(v, &email))? {
            return Ok(SeedOutcome::AlreadyExists(existing.profile()));
        }

        self.credentials.validate_password(password)?;
        let hash = self.credentials.hash_password(password)?;

        let outcome = self.docs.update(|txn| {
            if let Some(existing) = find_by_email(&*txn, &email)? {
                return Ok(SeedOutcome::AlreadyExists(existing.profile()));
            }
            ensure_unique(&*txn, &email, ADMIN_ROLL)?;

            let admin = Account::new(ADMIN_ROLL, "Administrator", "Administration", &email, hash, Role::Admin);
            txn.put(Bucket::Users, &admin.key(), &admin)?;
            Ok::<_, AuthError>(SeedOutcome::Created(admin.profile()))
        })?;

        if let SeedOutcome::Created(profile) = &outcome {
            tracing::info!(account = %profile.id, "administrator seeded");
        }
        Ok(outcome)
    }
}

/// Account with `email` (already normalized), if any
pub(crate) fn find_by_email<D: Documents + ?Sized>(docs: &D, email: &str) -> AuthResult<Option<Account>> {
    match docs.find_one(Bucket::Users, |a: &Account| a.email == email) {
        Ok(account) => Ok(Some(account)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn ensure_unique<D: Documents + ?Sized>(docs: &D, email: &str, roll: &str) -> AuthResult<()> {
    match docs.find_one(Bucket::Users, |a: &Account| a.email == email || a.roll == roll) {
        Ok(existing) if existing.email == email => {
            Err(AuthError::Conflict("email already registered".to_string()))
        }
        Ok(_) => Err(AuthError::Conflict("roll already registered".to_string())),
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn validate_email(email: &str) -> AuthResult<()> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !email.contains(char::is_whitespace) => {
            Ok(())
        }
        _ => Err(AuthError::Validation("email is not a valid address".to_string())),
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{HashCost, PasswordPolicy, SessionConfig};
    use crate::notify::RecordingNotifier;
    use chrono::Duration;
    use std::sync::Arc;

    fn service() -> (AccountService, Arc<RecordingNotifier>) {
        let recorder = Arc::new(RecordingNotifier::new());
        let credentials = CredentialService::new(
            HashCost::minimal(),
            PasswordPolicy::default(),
            SessionConfig::with_secret(Some("accounts-test"), Duration::days(30)),
        );
        let service = AccountService::new(
            DocumentStore::in_memory().unwrap(),
            credentials,
            Dispatcher::new(recorder.clone(), "http://portal"),
        );
        (service, recorder)
    }

    fn request(roll: &str, email: &str) -> RegisterRequest {
        RegisterRequest {
            roll: roll.to_string(),
            name: "Ada".to_string(),
            department: "CSE".to_string(),
            email: email.to_string(),
            password: "secret1".to_string(),
        }
    }

    #[test]
    fn test_register_then_login() {
        let (service, _) = service();
        let session = service.register(request("R1", "a@x.com")).unwrap();
        assert_eq!(session.account.role, Role::User);

        let again = service.login("A@X.com ", "secret1").unwrap();
        assert_eq!(again.account.id, session.account.id);
    }

    #[test]
    fn test_duplicate_email_or_roll_conflicts() {
        let (service, _) = service();
        service.register(request("R1", "a@x.com")).unwrap();

        let dup_email = service.register(request("R2", "A@x.com")).unwrap_err();
        assert!(matches!(dup_email, AuthError::Conflict(ref m) if m.contains("email")));

        let dup_roll = service.register(request("R1", "b@x.com")).unwrap_err();
        assert!(matches!(dup_roll, AuthError::Conflict(ref m) if m.contains("roll")));

        assert_eq!(service.docs.count(Bucket::Users).unwrap(), 1);
    }

    #[test]
    fn test_register_validates_fields() {
        let (service, _) = service();
        let mut missing = request("R1", "a@x.com");
        missing.name = "  ".to_string();
        assert!(matches!(service.register(missing), Err(AuthError::Validation(_))));

        assert!(matches!(
            service.register(request("R1", "not-an-email")),
            Err(AuthError::Validation(_))
        ));

        let mut weak = request("R1", "a@x.com");
        weak.password = "123".to_string();
        assert!(matches!(service.register(weak), Err(AuthError::WeakPassword(_))));
    }

    #[test]
    fn test_login_failures_are_indistinguishable() {
        let (service, _) = service();
        service.register(request("R1", "a@x.com")).unwrap();

        let unknown = service.login("nobody@x.com", "secret1").unwrap_err();
        let wrong = service.login("a@x.com", "wrong-pass").unwrap_err();
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[test]
    fn test_unknown_email_login_still_hashes() {
        let (service, _) = service();
        let err = service.login("ghost@x.com", "secret1").unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        assert!(service.credentials.dummy_hash_built());
    }

    #[test]
    fn test_authenticate_and_admin_gate() {
        let (service, _) = service();
        let session = service.register(request("R1", "a@x.com")).unwrap();

        let account = service.authenticate(&session.token).unwrap();
        assert_eq!(account.id, session.account.id);
        assert!(matches!(service.require_admin(&account), Err(AuthError::Unauthorized)));

        assert!(matches!(service.authenticate("a.b.c"), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_token_for_deleted_account_is_invalid() {
        let (service, _) = service();
        let session = service.register(request("R1", "a@x.com")).unwrap();
        service.docs.delete(Bucket::Users, &session.account.id.to_string()).unwrap();

        assert!(matches!(service.authenticate(&session.token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_update_profile_ignores_blank_fields() {
        let (service, _) = service();
        let id = service.register(request("R1", "a@x.com")).unwrap().account.id;

        let profile = service
            .update_profile(
                id,
                ProfileUpdate {
                    name: Some("Grace".to_string()),
                    department: Some("   ".to_string()),
                },
            )
            .unwrap();

        assert_eq!(profile.name, "Grace");
        assert_eq!(profile.department, "CSE");
    }

    #[test]
    fn test_change_password_requires_current() {
        let (service, recorder) = service();
        let id = service.register(request("R1", "a@x.com")).unwrap().account.id;

        assert!(matches!(
            service.change_password(id, "wrong-pass", "newpass1"),
            Err(AuthError::InvalidCredentials)
        ));

        service.change_password(id, "secret1", "newpass1").unwrap();
        assert!(service.login("a@x.com", "secret1").is_err());
        assert!(service.login("a@x.com", "newpass1").is_ok());

        // welcome + password changed
        let sent = recorder.wait_for(2, std::time::Duration::from_secs(5));
        assert!(sent.iter().any(|m| m.subject.contains("password was changed")));
    }

    #[test]
    fn test_seed_admin_is_idempotent() {
        let (service, _) = service();

        let first = service.seed_admin("Admin@X.com", "admin123").unwrap();
        let created = match first {
            SeedOutcome::Created(profile) => profile,
            other => panic!("expected Created, got {:?}", other),
        };
        assert_eq!(created.role, Role::Admin);
        assert_eq!(created.roll, ADMIN_ROLL);

        let second = service.seed_admin("admin@x.com", "different1").unwrap();
        assert_eq!(second, SeedOutcome::AlreadyExists(created));
        assert!(service.login("admin@x.com", "admin123").is_ok());
    }

    #[test]
    fn test_welcome_notification_sent_on_register() {
        let (service, recorder) = service();
        service.register(request("R1", "a@x.com")).unwrap();

        let sent = recorder.wait_for(1, std::time::Duration::from_secs(5));
        assert_eq!(sent[0].to, "a@x.com");
        assert!(!sent[0].body.contains("secret1"));
    }

    #[test]
    fn test_broadcast_filters_by_audience() {
        let (service, recorder) = service();
        let student = service.register(request("R1", "a@x.com")).unwrap();
        let mut physics = request("R2", "b@x.com");
        physics.department = "Physics".to_string();
        service.register(physics).unwrap();

        let admin_id = match service.seed_admin("admin@x.com", "adminpass").unwrap() {
            SeedOutcome::Created(profile) => profile.id,
            SeedOutcome::AlreadyExists(profile) => profile.id,
        };
        let admin: Account = service.docs.get(Bucket::Users, &admin_id.to_string()).unwrap();
        let student: Account = service.docs.get(Bucket::Users, &student.account.id.to_string()).unwrap();

        assert!(matches!(
            service.broadcast(&student, &Audience::All, "s", "b"),
            Err(AuthError::Unauthorized)
        ));
        assert!(matches!(
            service.broadcast(&admin, &Audience::All, " ", "b"),
            Err(AuthError::Validation(_))
        ));

        assert_eq!(service.broadcast(&admin, &Audience::All, "all", "b").unwrap(), 3);
        assert_eq!(service.broadcast(&admin, &Audience::Students, "students", "b").unwrap(), 2);
        let physics_only = Audience::Department("physics".to_string());
        assert_eq!(service.broadcast(&admin, &physics_only, "physics", "b").unwrap(), 1);

        // two welcomes + 3 + 2 + 1 broadcasts
        let sent = recorder.wait_for(8, std::time::Duration::from_secs(5));
        let physics: Vec<_> = sent.iter().filter(|m| m.subject == "physics").collect();
        assert_eq!(physics.len(), 1);
        assert_eq!(physics[0].to, "b@x.com");
        assert!(sent
            .iter()
            .filter(|m| m.subject == "students")
            .all(|m| m.to != "admin@x.com"));
    }
}
