//! Errors surfaced to chat users.

use crate::timesheet::money::MoneyError;
use crate::timesheet::report::ReportArgsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("/{0} is admin-only")]
    Unauthorized(&'static str),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("driver {0} not found")]
    DriverNotFound(i64),

    #[error("claim #{0} not found")]
    ClaimNotFound(i64),

    /// A well-formed request that the current state does not allow.
    #[error("{0}")]
    Rejected(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Money(#[from] MoneyError),

    #[error(transparent)]
    ReportArgs(#[from] ReportArgsError),
}

impl BotError {
    /// The plain-text reply shown to the sender.
    pub fn user_message(&self) -> String {
        match self {
            BotError::Unauthorized(_) => {
                "⛔ Sorry, this command is only available for administrators.".to_string()
            }
            BotError::Usage(usage) => format!("❌ Usage: {usage}"),
            BotError::DriverNotFound(id) => {
                format!("❌ Driver {id} not found. They need to send /start to the bot first.")
            }
            BotError::ClaimNotFound(id) => format!("❌ Claim #{id} not found."),
            BotError::Database(_) => {
                "❌ An error occurred. Please try again or contact admin.".to_string()
            }
            BotError::InvalidArgument(msg) | BotError::Rejected(msg) => format!("❌ {msg}"),
            BotError::Money(e) => format!("❌ {e}"),
            BotError::ReportArgs(e) => format!("❌ {e}"),
        }
    }

    /// Whether this is a server-side failure rather than a user mistake.
    pub fn is_internal(&self) -> bool {
        matches!(self, BotError::Database(_))
    }
}

pub type BotResult<T> = Result<T, BotError>;
