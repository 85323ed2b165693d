//! CLI argument definitions using clap
//!
//! Commands:
//! - voiceboard init
//! - voiceboard seed-admin --email <email> --password <password>
//! - voiceboard stats
//! - voiceboard reset-request --email <email>
//! - voiceboard reset-confirm --token <token> --password <password>
//! - voiceboard purge-resets
//! - voiceboard broadcast --from <admin email> --subject <s> --body <b> [--audience <a>]
//! - voiceboard compact
//!
//! Every command takes an optional `--config <path>`; environment variables
//! override the file.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// voiceboard - issue portal store and account administration
#[derive(Parser, Debug)]
#[command(name = "voiceboard")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Debug-level logging (ignored when RUST_LOG is set)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the store file and its buckets
    Init {
        /// Path to configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create the administrator account if it does not exist
    SeedAdmin {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        email: String,

        #[arg(long)]
        password: String,
    },

    /// Print store and issue counts
    Stats {
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Send a password-reset link to an account
    ResetRequest {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        email: String,
    },

    /// Set a new password with a reset token
    ResetConfirm {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        token: String,

        #[arg(long)]
        password: String,
    },

    /// Delete used and expired reset tokens
    PurgeResets {
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Send a message to every account in an audience
    Broadcast {
        #[arg(long)]
        config: Option<PathBuf>,

        /// Email of the administrator sending the message
        #[arg(long)]
        from: String,

        /// all, students or department:<name>
        #[arg(long, default_value = "all")]
        audience: String,

        #[arg(long)]
        subject: String,

        #[arg(long)]
        body: String,
    },

    /// Rewrite the store file without overwritten or deleted values
    Compact {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
