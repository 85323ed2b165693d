//! Settings
//!
//! Loaded from an optional JSON file, then overridden by environment
//! variables, then validated. Every field has a default so an empty file
//! (or no file) is a working development setup.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::{PasswordPolicy, SessionConfig, DEFAULT_RESET_TTL_MINUTES, INSECURE_DEFAULT_SECRET};

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Longest accepted session lifetime (ten years)
pub const MAX_SESSION_TTL_DAYS: u32 = 3650;

/// Longest accepted reset token lifetime (one week)
pub const MAX_RESET_TOKEN_TTL_MINUTES: u32 = 7 * 24 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {name}: {value}")]
    InvalidOverride { name: &'static str, value: String },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Runtime settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Store file (`DATABASE_PATH`)
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Session signing secret (`JWT_SECRET`)
    #[serde(default)]
    pub jwt_secret: Option<String>,

    /// Deployment environment (`APP_ENV`)
    #[serde(default = "default_app_env")]
    pub app_env: String,

    /// Base URL used in emailed links (`FRONTEND_URL`)
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,

    /// Session token lifetime (`SESSION_TTL_DAYS`)
    #[serde(default = "default_session_ttl_days")]
    pub session_ttl_days: u32,

    /// Reset token lifetime (`RESET_TOKEN_TTL_MINUTES`)
    #[serde(default = "default_reset_ttl_minutes")]
    pub reset_token_ttl_minutes: u32,

    #[serde(default = "default_password_min_length")]
    pub password_min_length: usize,

    /// Append outgoing notifications to this JSON-lines file instead of
    /// logging them (`NOTIFY_OUTBOX`)
    #[serde(default)]
    pub notify_outbox: Option<PathBuf>,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./data/app.db")
}
fn default_app_env() -> String {
    "development".to_string()
}
fn default_frontend_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_session_ttl_days() -> u32 {
    30
}
fn default_reset_ttl_minutes() -> u32 {
    DEFAULT_RESET_TTL_MINUTES as u32
}
fn default_password_min_length() -> usize {
    PasswordPolicy::default().min_length
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            jwt_secret: None,
            app_env: default_app_env(),
            frontend_url: default_frontend_url(),
            session_ttl_days: default_session_ttl_days(),
            reset_token_ttl_minutes: default_reset_ttl_minutes(),
            password_min_length: default_password_min_length(),
            notify_outbox: None,
        }
    }
}

impl Settings {
    /// File (if given), then process environment, then validation.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_overrides(|name| std::env::var(name).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Apply overrides from `lookup` (normally the process environment).
    /// Unset and blank variables are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(path) = var("DATABASE_PATH") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(secret) = var("JWT_SECRET") {
            self.jwt_secret = Some(secret);
        }
        if let Some(env) = var("APP_ENV") {
            self.app_env = env;
        }
        if let Some(url) = var("FRONTEND_URL") {
            self.frontend_url = url;
        }
        if let Some(days) = var("SESSION_TTL_DAYS") {
            self.session_ttl_days = parse_number("SESSION_TTL_DAYS", &days)?;
        }
        if let Some(minutes) = var("RESET_TOKEN_TTL_MINUTES") {
            self.reset_token_ttl_minutes = parse_number("RESET_TOKEN_TTL_MINUTES", &minutes)?;
        }
        if let Some(outbox) = var("NOTIFY_OUTBOX") {
            self.notify_outbox = Some(PathBuf::from(outbox));
        }
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.session_ttl_days == 0 || self.session_ttl_days > MAX_SESSION_TTL_DAYS {
            return Err(ConfigError::Invalid(format!(
                "session_ttl_days must be between 1 and {}",
                MAX_SESSION_TTL_DAYS
            )));
        }
        if self.reset_token_ttl_minutes == 0 || self.reset_token_ttl_minutes > MAX_RESET_TOKEN_TTL_MINUTES {
            return Err(ConfigError::Invalid(format!(
                "reset_token_ttl_minutes must be between 1 and {}",
                MAX_RESET_TOKEN_TTL_MINUTES
            )));
        }
        if self.password_min_length == 0 {
            return Err(ConfigError::Invalid("password_min_length must be > 0".to_string()));
        }
        if self.frontend_url.trim().is_empty() {
            return Err(ConfigError::Invalid("frontend_url must not be empty".to_string()));
        }
        if self.is_production() && self.session_config().is_insecure() {
            return Err(ConfigError::Invalid(format!(
                "JWT_SECRET must be set in production (refusing '{}')",
                INSECURE_DEFAULT_SECRET
            )));
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::with_secret(
            self.jwt_secret.as_deref(),
            Duration::days(i64::from(self.session_ttl_days)),
        )
    }

    pub fn reset_ttl(&self) -> Duration {
        Duration::minutes(i64::from(self.reset_token_ttl_minutes))
    }

    pub fn password_policy(&self) -> PasswordPolicy {
        PasswordPolicy {
            min_length: self.password_min_length,
        }
    }
}

fn parse_number(name: &'static str, value: &str) -> ConfigResult<u32> {
    value.trim().parse().map_err(|_| ConfigError::InvalidOverride {
        name,
        value: value.to_string(),
    })
}
