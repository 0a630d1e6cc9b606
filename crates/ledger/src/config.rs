//! Ledger configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `LEDGER_DATABASE_URL` - `PostgreSQL` connection string
//!
//! ## Optional
//! - `LEDGER_DEFAULT_MODEL` - AI model name used to seed new usage records
//!   (default: `scribe-standard-v2`)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SMTP_HOST` - SMTP relay host; enables email dispatch when set
//! - `SMTP_PORT` - SMTP port (default: 587)
//! - `SMTP_USERNAME` - SMTP username (required when `SMTP_HOST` is set)
//! - `SMTP_PASSWORD` - SMTP password (required when `SMTP_HOST` is set)
//! - `SMTP_FROM_ADDRESS` - From address for ledger emails (required when
//!   `SMTP_HOST` is set)

use secrecy::SecretString;
use thiserror::Error;

/// Default AI model recorded on freshly created usage rows.
const DEFAULT_MODEL: &str = "scribe-standard-v2";

/// Default SMTP submission port.
const DEFAULT_SMTP_PORT: u16 = 587;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Ledger configuration.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// `PostgreSQL` connection URL (contains password).
    pub database_url: SecretString,
    /// AI model name used to seed new usage records.
    pub default_model: String,
    /// Sentry DSN for error tracking (binaries only).
    pub sentry_dsn: Option<String>,
    /// SMTP configuration; `None` disables email dispatch.
    pub email: Option<EmailConfig>,
}

/// SMTP delivery configuration.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct EmailConfig {
    /// SMTP relay host.
    pub smtp_host: String,
    /// SMTP port.
    pub smtp_port: u16,
    /// SMTP username.
    pub smtp_username: String,
    /// SMTP password.
    pub smtp_password: SecretString,
    /// From address for all ledger emails.
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

impl LedgerConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a required variable is missing or a value
    /// fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = require_env("LEDGER_DATABASE_URL")?.into();

        let default_model = std::env::var("LEDGER_DEFAULT_MODEL")
            .unwrap_or_else(|_| DEFAULT_MODEL.to_owned());

        let sentry_dsn = std::env::var("SENTRY_DSN").ok().filter(|v| !v.is_empty());

        let email = match std::env::var("SMTP_HOST") {
            Ok(smtp_host) if !smtp_host.is_empty() => {
                let smtp_port = match std::env::var("SMTP_PORT") {
                    Ok(raw) => raw.parse::<u16>().map_err(|e| {
                        ConfigError::InvalidEnvVar("SMTP_PORT".to_owned(), e.to_string())
                    })?,
                    Err(_) => DEFAULT_SMTP_PORT,
                };
                Some(EmailConfig {
                    smtp_host,
                    smtp_port,
                    smtp_username: require_env("SMTP_USERNAME")?,
                    smtp_password: require_env("SMTP_PASSWORD")?.into(),
                    from_address: require_env("SMTP_FROM_ADDRESS")?,
                })
            }
            _ => None,
        };

        Ok(Self {
            database_url,
            default_model,
            sentry_dsn,
            email,
        })
    }
}

fn require_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_owned()))
}
