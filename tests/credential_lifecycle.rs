//! Credential Lifecycle Tests
//!
//! End-to-end through [`Portal`] over a file-backed store:
//! - Registration uniqueness on email and roll
//! - Session token expiry boundary
//! - Reset tokens: single use, expiry, identical acks for unknown emails
//! - Vote toggling is idempotent per account and additive across accounts

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tempfile::TempDir;
use voiceboard::auth::{AuthError, HashCost, RegisterRequest};
use voiceboard::config::Settings;
use voiceboard::issues::NewIssue;
use voiceboard::models::{Account, PasswordResetToken};
use voiceboard::notify::RecordingNotifier;
use voiceboard::portal::Portal;
use voiceboard::repository::{Bucket, DocumentStore};

// =============================================================================
// Test Utilities
// =============================================================================

struct Harness {
    _temp_dir: TempDir,
    portal: Portal,
    recorder: Arc<RecordingNotifier>,
}

fn harness() -> Harness {
    let temp_dir = TempDir::new().unwrap();
    let settings = Settings {
        database_path: temp_dir.path().join("app.db"),
        jwt_secret: Some("lifecycle-test-secret".to_string()),
        ..Settings::default()
    };
    let recorder = Arc::new(RecordingNotifier::new());
    let docs = DocumentStore::open(&settings.database_path).unwrap();
    let portal = Portal::build(docs, &settings, recorder.clone(), HashCost::minimal());

    Harness {
        _temp_dir: temp_dir,
        portal,
        recorder,
    }
}

fn request(roll: &str, email: &str, password: &str) -> RegisterRequest {
    RegisterRequest {
        roll: roll.to_string(),
        name: format!("User {}", roll),
        department: "CSE".to_string(),
        email: email.to_string(),
        password: password.to_string(),
    }
}

fn register(h: &Harness, roll: &str, email: &str) -> Account {
    let session = h.portal.accounts.register(request(roll, email, "oldpass")).unwrap();
    h.portal.accounts.authenticate(&session.token).unwrap()
}

fn stored_hash(h: &Harness, account: &Account) -> String {
    let stored: Account = h.portal.docs.get(Bucket::Users, &account.key()).unwrap();
    stored.password_hash
}

/// Secret from the most recent reset link sent to `email`.
fn reset_secret(recorder: &RecordingNotifier, email: &str, expected_messages: usize) -> String {
    let sent = recorder.wait_for(expected_messages, StdDuration::from_secs(5));
    let body = &sent
        .iter()
        .rev()
        .find(|m| m.to == email && m.subject.contains("Password Reset"))
        .unwrap()
        .body;
    let start = body.find("token=").unwrap() + "token=".len();
    body[start..].split_whitespace().next().unwrap().to_string()
}

// =============================================================================
// Accounts
// =============================================================================

#[test]
fn test_duplicate_email_is_conflict_before_write() {
    let h = harness();
    register(&h, "R1", "a@x.com");
    let before = h.portal.docs.engine().sequence();

    let err = h.portal.accounts.register(request("R2", "A@X.com", "secret1")).unwrap_err();
    assert!(matches!(err, AuthError::Conflict(_)));
    assert_eq!(err.status_code(), 409);
    assert_eq!(h.portal.docs.engine().sequence(), before);
    assert_eq!(h.portal.docs.count(Bucket::Users).unwrap(), 1);
}

#[test]
fn test_duplicate_roll_is_conflict() {
    let h = harness();
    register(&h, "R1", "a@x.com");

    let err = h.portal.accounts.register(request("R1", "b@x.com", "secret1")).unwrap_err();
    assert!(matches!(err, AuthError::Conflict(_)));
    assert_eq!(h.portal.docs.count(Bucket::Users).unwrap(), 1);
}

#[test]
fn test_password_is_never_stored_in_plaintext() {
    let h = harness();
    let account = register(&h, "R1", "a@x.com");

    let hash = stored_hash(&h, &account);
    assert_ne!(hash, "oldpass");
    assert!(hash.starts_with("$argon2id$"));
    assert!(h.portal.accounts.login("a@x.com", "oldpass").is_ok());
    assert!(matches!(
        h.portal.accounts.login("a@x.com", "wrong"),
        Err(AuthError::InvalidCredentials)
    ));
}

// =============================================================================
// Session Tokens
// =============================================================================

#[test]
fn test_session_token_expiry_boundary() {
    let h = harness();
    let account = register(&h, "R1", "a@x.com");
    let sessions = h.portal.accounts.credentials().sessions();
    let now = Utc::now();

    let expired = sessions.issue_at(account.id, now - sessions.ttl() - Duration::seconds(1)).unwrap();
    assert!(matches!(sessions.verify(&expired), Err(AuthError::ExpiredToken)));
    assert!(matches!(
        h.portal.accounts.authenticate(&expired),
        Err(AuthError::ExpiredToken)
    ));

    let live = sessions.issue_at(account.id, now - sessions.ttl() + Duration::seconds(1)).unwrap();
    assert_eq!(sessions.verify(&live).unwrap(), account.id);
}

#[test]
fn test_tampered_session_token_is_invalid() {
    let h = harness();
    let session = h.portal.accounts.register(request("R1", "a@x.com", "oldpass")).unwrap();

    // Flip the first character of the signature segment
    let split = session.token.rfind('.').unwrap() + 1;
    let (head, signature) = session.token.split_at(split);
    let replacement = if signature.starts_with('A') { "B" } else { "A" };
    let tampered = format!("{}{}{}", head, replacement, &signature[1..]);

    assert!(matches!(
        h.portal.accounts.authenticate(&tampered),
        Err(AuthError::InvalidToken)
    ));
}

// =============================================================================
// Password Reset
// =============================================================================

#[test]
fn test_reset_ack_is_identical_for_unknown_email() {
    let h = harness();
    register(&h, "R1", "real@x.com");

    let real = h.portal.resets.request_reset("real@x.com").unwrap();
    let fake = h.portal.resets.request_reset("nonexistent@x.com").unwrap();

    assert_eq!(real, fake);
    assert_eq!(
        serde_json::to_value(&real).unwrap(),
        serde_json::to_value(&fake).unwrap()
    );
    assert_eq!(h.portal.docs.count(Bucket::PasswordResets).unwrap(), 1);
}

#[test]
fn test_reset_is_single_use() {
    let h = harness();
    let account = register(&h, "R1", "a@x.com");

    h.portal.resets.request_reset("a@x.com").unwrap();
    let secret = reset_secret(&h.recorder, "a@x.com", 2);

    h.portal.resets.consume_reset(&secret, "newpass").unwrap();
    let after_first = stored_hash(&h, &account);

    let err = h.portal.resets.consume_reset(&secret, "otherpass").unwrap_err();
    assert!(matches!(err, AuthError::AlreadyUsedToken));

    // The hash record is still there, only marked used
    let tokens: Vec<PasswordResetToken> = h.portal.docs.get_all(Bucket::PasswordResets).unwrap();
    assert_eq!(tokens.len(), 1);
    assert!(tokens[0].used);

    assert_eq!(stored_hash(&h, &account), after_first);
    assert!(h.portal.accounts.login("a@x.com", "newpass").is_ok());
}

#[test]
fn test_expired_reset_leaves_password_hash_unchanged() {
    let h = harness();
    let account = register(&h, "R1", "a@x.com");
    let original = stored_hash(&h, &account);

    let requested = Utc::now();
    h.portal.resets.request_reset_at("a@x.com", requested).unwrap();
    let secret = reset_secret(&h.recorder, "a@x.com", 2);

    let past_expiry = requested + h.portal.resets.ttl() + Duration::seconds(1);
    let err = h
        .portal
        .resets
        .consume_reset_at(&secret, "newpass", past_expiry)
        .unwrap_err();

    assert!(matches!(err, AuthError::InvalidOrExpiredToken));
    assert_eq!(err.public_message(), "Invalid or expired reset token");
    assert_eq!(stored_hash(&h, &account), original);
    assert!(h.portal.accounts.login("a@x.com", "oldpass").is_ok());
}

#[test]
fn test_reset_survives_reopen_and_stays_single_use() {
    let temp_dir = TempDir::new().unwrap();
    let settings = Settings {
        database_path: temp_dir.path().join("app.db"),
        jwt_secret: Some("lifecycle-test-secret".to_string()),
        ..Settings::default()
    };
    let recorder = Arc::new(RecordingNotifier::new());

    let secret = {
        let docs = DocumentStore::open(&settings.database_path).unwrap();
        let portal = Portal::build(docs, &settings, recorder.clone(), HashCost::minimal());
        portal.accounts.register(request("R1", "a@x.com", "oldpass")).unwrap();
        portal.resets.request_reset("a@x.com").unwrap();
        reset_secret(&recorder, "a@x.com", 2)
    };

    let docs = DocumentStore::open(&settings.database_path).unwrap();
    let portal = Portal::build(docs, &settings, recorder, HashCost::minimal());
    portal.resets.consume_reset(&secret, "newpass").unwrap();
    assert!(matches!(
        portal.resets.consume_reset(&secret, "newpass"),
        Err(AuthError::AlreadyUsedToken)
    ));
}

// =============================================================================
// Votes
// =============================================================================

#[test]
fn test_vote_toggle_is_idempotent_and_additive() {
    let h = harness();
    let owner = register(&h, "R1", "a@x.com");
    let alice = register(&h, "R2", "b@x.com");
    let bob = register(&h, "R3", "c@x.com");

    let issue = h
        .portal
        .issues
        .create(
            &owner,
            NewIssue {
                title: "Leaking tap".to_string(),
                description: "Second floor washroom".to_string(),
                category: "Maintenance".to_string(),
                priority: None,
                image_url: None,
            },
        )
        .unwrap();

    let (once, _) = h.portal.issues.toggle_vote(&alice, issue.id).unwrap();
    let (twice, _) = h.portal.issues.toggle_vote(&alice, issue.id).unwrap();
    assert_eq!(once.votes, 1);
    assert_eq!(twice.votes, issue.votes);
    assert_eq!(twice.voted_users, issue.voted_users);

    h.portal.issues.toggle_vote(&bob, issue.id).unwrap();
    let (both, _) = h.portal.issues.toggle_vote(&alice, issue.id).unwrap();
    assert_eq!(both.votes, 2);
    assert!(both.has_voted(alice.id) && both.has_voted(bob.id));
    assert_eq!(both.votes as usize, both.voted_users.len());
}
