//! CLI module for voiceboard
//!
//! Operator commands over the store:
//! - init: create the store file and buckets
//! - seed-admin: create the administrator account
//! - stats: store and issue counts
//! - reset-request / reset-confirm: password reset flow
//! - purge-resets: drop used and expired reset tokens

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{init, purge_resets, reset_confirm, reset_request, run, run_command, seed_admin, stats};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_error, write_response};
