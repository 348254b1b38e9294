use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::constants::*;
use crate::state::UserId;

pub const TOKEN_ENV: &str = "GIVEAWAY_BOT_TOKEN";
pub const DATABASE_URL_ENV: &str = "GIVEAWAY_DATABASE_URL";

/// Tunables for the lifecycle engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub poll_interval_secs: u64,
    pub reminder_threshold_secs: i64,
    pub external_call_timeout_secs: u64,
    pub broadcast_concurrency: usize,
    pub participation_credits: i64,
    pub winner_credits: i64,
    pub referral_credits: i64,
    pub min_redemption_credits: i64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: POLL_INTERVAL_SECS,
            reminder_threshold_secs: REMINDER_THRESHOLD_SECS,
            external_call_timeout_secs: EXTERNAL_CALL_TIMEOUT_SECS,
            broadcast_concurrency: BROADCAST_CONCURRENCY,
            participation_credits: PARTICIPATION_CREDITS,
            winner_credits: WINNER_CREDITS,
            referral_credits: REFERRAL_CREDITS,
            min_redemption_credits: MIN_REDEMPTION_CREDITS,
        }
    }
}

impl EngineSettings {
    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: &'static str| -> Result<(), ConfigError> {
            Err(ConfigError::InvalidSetting { field, reason })
        };
        if self.poll_interval_secs == 0 {
            return invalid("poll_interval_secs", "must be at least 1");
        }
        if self.external_call_timeout_secs == 0 {
            return invalid("external_call_timeout_secs", "must be at least 1");
        }
        if self.broadcast_concurrency == 0 {
            return invalid("broadcast_concurrency", "must be at least 1");
        }
        for (field, amount) in [
            ("participation_credits", self.participation_credits),
            ("winner_credits", self.winner_credits),
            ("referral_credits", self.referral_credits),
        ] {
            if amount < 0 {
                return invalid(field, "must not be negative");
            }
        }
        Ok(())
    }

    /// Never zero, so a watcher built from unchecked settings still ticks.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn external_call_timeout(&self) -> Duration {
        Duration::from_secs(self.external_call_timeout_secs.max(1))
    }

    pub fn reminder_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.reminder_threshold_secs)
    }
}

/// Process configuration for the bot binary.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default)]
    pub admin_ids: Vec<UserId>,
    #[serde(default)]
    pub engine: EngineSettings,
}

fn default_database_url() -> String {
    "sqlite://giveaway.db?mode=rwc".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("bot token is missing; set it in the config file or {TOKEN_ENV}")]
    MissingToken,
    #[error("invalid engine setting `{field}`: {reason}")]
    InvalidSetting {
        field: &'static str,
        reason: &'static str,
    },
}

impl BotConfig {
    /// Loads the JSON config at `path` (if given) and applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config: BotConfig = match path {
            Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
            None => serde_json::from_str("{}")?,
        };
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            config.bot_token = token;
        }
        if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
            config.database_url = url;
        }
        if config.bot_token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }
        config.engine.validate()?;
        Ok(config)
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.admin_ids.contains(&user_id)
    }
}
