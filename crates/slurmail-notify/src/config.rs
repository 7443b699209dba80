//! Environment-driven configuration.
//!
//! Settings come from `SLURM_EMAIL_*` environment variables, optionally
//! seeded from `$HOME/.env`. Variables already set in the process
//! environment always win over file entries, so per-job overrides in a
//! prologue script behave as expected.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use slurmail_smtp::types::{Credentials, EmailAddress, SmtpConfig, SmtpSecurity};

use crate::error::{NotifyError, NotifyResult};

pub const ENV_SMTP_SERVER: &str = "SLURM_EMAIL_SMTP_SERVER";
pub const ENV_SMTP_PORT: &str = "SLURM_EMAIL_SMTP_PORT";
pub const ENV_SMTP_USER: &str = "SLURM_EMAIL_SMTP_USER";
pub const ENV_SMTP_PASSWORD: &str = "SLURM_EMAIL_SMTP_PASSWORD";
pub const ENV_SMTP_SECURITY: &str = "SLURM_EMAIL_SMTP_SECURITY";
pub const ENV_FROM: &str = "SLURM_EMAIL_FROM";
pub const ENV_TO: &str = "SLURM_EMAIL_TO";

/// Everything needed to deliver one notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    pub smtp: SmtpConfig,
    pub from: EmailAddress,
    pub to: EmailAddress,
}

impl NotifierConfig {
    /// Build the configuration from the process environment, after
    /// loading `$HOME/.env` if one exists.
    pub fn from_env() -> NotifyResult<Self> {
        load_home_dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> NotifyResult<Self> {
        let host = require(&get, ENV_SMTP_SERVER)?;
        let port = match get(ENV_SMTP_PORT) {
            Some(raw) => raw.parse::<u16>().map_err(|_| {
                NotifyError::config(format!("{} is not a valid port: {:?}", ENV_SMTP_PORT, raw))
            })?,
            None => 587,
        };
        let security = match get(ENV_SMTP_SECURITY) {
            Some(raw) => parse_security(&raw)?,
            None => SmtpSecurity::StartTls,
        };
        let user = require(&get, ENV_SMTP_USER)?;
        let password = require(&get, ENV_SMTP_PASSWORD)?;

        // Sender falls back to the SMTP login, which on submission
        // servers is usually a full mailbox address anyway.
        let from = match get(ENV_FROM) {
            Some(raw) => parse_address(ENV_FROM, &raw)?,
            None => parse_address(ENV_SMTP_USER, &user)?,
        };
        let to = parse_address(ENV_TO, &require(&get, ENV_TO)?)?;

        let smtp = SmtpConfig {
            host,
            port,
            security,
            credentials: Some(Credentials::new(user, password)),
            ..SmtpConfig::default()
        };
        Ok(Self { smtp, from, to })
    }
}

fn require(get: &impl Fn(&str) -> Option<String>, var: &str) -> NotifyResult<String> {
    // An empty value is as useless as a missing one.
    get(var)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| NotifyError::config(format!("environment variable {} is not set", var)))
}

fn parse_address(var: &str, raw: &str) -> NotifyResult<EmailAddress> {
    let invalid =
        || NotifyError::config(format!("{} is not a valid email address: {:?}", var, raw));
    let addr = EmailAddress::parse(raw).map_err(|_| invalid())?;
    if !addr.is_valid() {
        return Err(invalid());
    }
    Ok(addr)
}

fn parse_security(raw: &str) -> NotifyResult<SmtpSecurity> {
    match raw.to_ascii_lowercase().as_str() {
        "none" => Ok(SmtpSecurity::None),
        "starttls" => Ok(SmtpSecurity::StartTls),
        "tls" => Ok(SmtpSecurity::ImplicitTls),
        _ => Err(NotifyError::config(format!(
            "{} must be one of none, starttls, tls (got {:?})",
            ENV_SMTP_SECURITY, raw
        ))),
    }
}

/// Load `$HOME/.env` when present. Missing file is fine; a malformed
/// one is logged and skipped rather than aborting the notification.
fn load_home_dotenv() {
    let Some(path) = dirs::home_dir().map(|h| h.join(".env")) else {
        return;
    };
    match dotenvy::from_path(&path) {
        Ok(()) => debug!("loaded environment from {}", path.display()),
        Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("could not load {}: {}", path.display(), e),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
