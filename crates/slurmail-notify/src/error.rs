//! Error types for the notification pipeline.

use serde::{Deserialize, Serialize};
use slurmail_smtp::types::SmtpError;

/// Broad classification of a notification failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifyErrorKind {
    /// Missing or malformed configuration (environment, addresses).
    Config,
    /// The SMTP conversation failed.
    Delivery,
}

/// Error raised while preparing or delivering a notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyError {
    pub kind: NotifyErrorKind,
    pub message: String,
}

impl NotifyError {
    pub fn config(message: impl Into<String>) -> Self {
        Self {
            kind: NotifyErrorKind::Config,
            message: message.into(),
        }
    }

    pub fn delivery(message: impl Into<String>) -> Self {
        Self {
            kind: NotifyErrorKind::Delivery,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for NotifyError {}

impl From<SmtpError> for NotifyError {
    fn from(e: SmtpError) -> Self {
        Self::delivery(e.to_string())
    }
}

pub type NotifyResult<T> = Result<T, NotifyError>;

// ─── Tests ──────────────────────────────────────────────────────────
