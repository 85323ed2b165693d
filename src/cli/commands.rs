//! CLI command implementations
//!
//! Each command loads [`Settings`], opens the store through [`Portal`], does
//! one thing and returns the JSON payload that `run_command` prints.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{json, Value};

use crate::auth::SeedOutcome;
use crate::config::Settings;
use crate::notify::Audience;
use crate::portal::Portal;

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{write_error, write_response};

/// Main CLI entry point
///
/// Parses arguments, installs logging and dispatches. Failures are reported
/// as a JSON error object before being returned.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    crate::logging::init(cli.verbose);

    match run_command(cli.command) {
        Ok(data) => write_response(data),
        Err(e) => {
            write_error(e.code_str(), e.message())?;
            Err(e)
        }
    }
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<Value> {
    match cmd {
        Command::Init { config } => init(config.as_deref()),
        Command::SeedAdmin { config, email, password } => seed_admin(config.as_deref(), &email, &password),
        Command::Stats { config } => stats(config.as_deref()),
        Command::ResetRequest { config, email } => reset_request(config.as_deref(), &email),
        Command::ResetConfirm { config, token, password } => reset_confirm(config.as_deref(), &token, &password),
        Command::PurgeResets { config } => purge_resets(config.as_deref()),
        Command::Broadcast {
            config,
            from,
            audience,
            subject,
            body,
        } => broadcast(config.as_deref(), &from, &audience, &subject, &body),
        Command::Compact { config } => compact(config.as_deref()),
    }
}

fn open(config_path: Option<&Path>) -> CliResult<(Settings, Portal)> {
    let settings = Settings::load(config_path)?;
    let portal = Portal::open(&settings)?;
    Ok((settings, portal))
}

/// Create the store file and every bucket. Safe to repeat.
pub fn init(config_path: Option<&Path>) -> CliResult<Value> {
    let settings = Settings::load(config_path)?;
    let existed = settings.database_path.exists();
    let portal = Portal::open(&settings)?;

    Ok(json!({
        "initialized": true,
        "created": !existed,
        "database": settings.database_path.display().to_string(),
        "sequence": portal.docs.engine().sequence(),
    }))
}

pub fn seed_admin(config_path: Option<&Path>, email: &str, password: &str) -> CliResult<Value> {
    let (_, portal) = open(config_path)?;

    let (created, profile) = match portal.accounts.seed_admin(email, password)? {
        SeedOutcome::Created(profile) => (true, profile),
        SeedOutcome::AlreadyExists(profile) => (false, profile),
    };

    Ok(json!({
        "created": created,
        "account": serde_json::to_value(profile)?,
    }))
}

pub fn stats(config_path: Option<&Path>) -> CliResult<Value> {
    let (_, portal) = open(config_path)?;
    let store = portal.docs.engine().stats();
    let issues = portal.issues.admin_stats()?;

    let buckets: BTreeMap<String, usize> = store.buckets.into_iter().collect();
    Ok(json!({
        "sequence": store.sequence,
        "buckets": buckets,
        "issues": serde_json::to_value(issues)?,
    }))
}

pub fn reset_request(config_path: Option<&Path>, email: &str) -> CliResult<Value> {
    let (_, portal) = open(config_path)?;
    let ack = portal.resets.request_reset(email)?;
    portal.flush_notifications();
    Ok(serde_json::to_value(ack)?)
}

pub fn reset_confirm(config_path: Option<&Path>, token: &str, password: &str) -> CliResult<Value> {
    let (_, portal) = open(config_path)?;
    portal.resets.consume_reset(token, password)?;
    portal.flush_notifications();
    Ok(json!({ "message": "Password has been reset" }))
}

pub fn purge_resets(config_path: Option<&Path>) -> CliResult<Value> {
    let (_, portal) = open(config_path)?;
    let removed = portal.resets.purge_expired()?;
    Ok(json!({ "removed": removed }))
}

/// Queue a message to an audience on behalf of the administrator `from`.
pub fn broadcast(config_path: Option<&Path>, from: &str, audience: &str, subject: &str, body: &str) -> CliResult<Value> {
    let audience: Audience = audience.parse()?;
    let (_, portal) = open(config_path)?;

    let actor = portal
        .accounts
        .account_by_email(from)?
        .ok_or_else(|| CliError::rejected(format!("No account for {}", from.trim())))?;
    let queued = portal.accounts.broadcast(&actor, &audience, subject, body)?;
    portal.flush_notifications();

    Ok(json!({
        "audience": audience.to_string(),
        "queued": queued,
    }))
}

pub fn compact(config_path: Option<&Path>) -> CliResult<Value> {
    let (_, portal) = open(config_path)?;
    let compacted = portal.docs.engine().compact()?;
    Ok(json!({
        "sequence": compacted.sequence,
        "bytesBefore": compacted.bytes_before,
        "bytesAfter": compacted.bytes_after,
    }))
}
