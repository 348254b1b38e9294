use thiserror::Error;

use crate::state::UserId;

pub type Result<T, E = GiveawayError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum GiveawayError {
    #[error("User {0} does not exist")]
    UserNotFound(UserId),
    #[error("Giveaway text must not be empty")]
    EmptyText,
    #[error("A giveaway needs at least one winner")]
    WinnersTooLow,
    #[error("Duration must be at least {0} minute(s)")]
    DurationTooShort(i64),
    #[error("Duration exceeds the maximum of {0} minutes")]
    DurationTooLong(i64),
    #[error("Credit amount must be positive")]
    InvalidCreditAmount,
    #[error("At least {0} credits are required for a redemption")]
    RedemptionBelowMinimum(i64),
    #[error("Insufficient credits: balance is {balance}, requested {requested}")]
    InsufficientCredits { balance: i64, requested: i64 },
    #[error("User {0} is already banned")]
    AlreadyBanned(UserId),
    #[error("User {0} is not banned")]
    NotBanned(UserId),
    #[error("Store failure: {0}")]
    Store(#[from] sqlx::Error),
    #[error("Schema migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Failures reported by the chat platform transport.
#[derive(Debug, Error)]
pub enum MessengerError {
    #[error("HTTP transport failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Bot API rejected `{method}` ({code}): {description}")]
    Api {
        method: &'static str,
        code: i64,
        description: String,
    },
    #[error("Recipient unavailable: {0}")]
    Unavailable(String),
}
