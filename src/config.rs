use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use teloxide::types::ChatId;
use thiserror::Error;

use crate::timesheet::TimesheetConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", path.display())]
    ReadFile { path: PathBuf, source: std::io::Error },

    #[error("failed to parse config file '{}': {source}", path.display())]
    ParseJson { path: PathBuf, source: serde_json::Error },

    #[error("config validation error: {0}")]
    Validation(String),
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    telegram_bot_token: String,
    /// Telegram user ids allowed to run admin commands.
    #[serde(default)]
    admin_ids: Vec<i64>,
    /// `sqlite://path`, a plain path, or `:memory:`.
    database_url: Option<String>,
    /// IANA time zone used for work dates.
    timezone: Option<String>,
    currency: Option<String>,
    workdays_per_month: Option<u32>,
    /// Chat that receives WARN/ERROR log lines.
    log_chat_id: Option<i64>,
    /// Directory for logs and the default database. Defaults to current directory.
    data_dir: Option<String>,
}

const DEFAULT_TIMEZONE: &str = "Asia/Kuala_Lumpur";
const DEFAULT_CURRENCY: &str = "RM";
const DEFAULT_WORKDAYS_PER_MONTH: u32 = 26;

pub struct Config {
    pub telegram_bot_token: String,
    pub admin_ids: HashSet<i64>,
    pub database_url: String,
    pub timezone: Tz,
    pub currency: String,
    pub workdays_per_month: u32,
    pub log_chat_id: Option<ChatId>,
    pub data_dir: PathBuf,
}

impl Config {
    /// Load the JSON file (a missing file is fine), then apply `.env` and
    /// environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::load_with(path.as_ref(), |key| std::env::var(key).ok())
    }

    /// Like [`Config::load`] with an explicit environment lookup.
    pub fn load_with(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let file: ConfigFile = match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseJson { path: path.to_path_buf(), source: e })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ConfigFile::default(),
            Err(e) => return Err(ConfigError::ReadFile { path: path.to_path_buf(), source: e }),
        };
        Self::from_file(file, env)
    }

    fn from_file(file: ConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let telegram_bot_token = env("TELEGRAM_TOKEN")
            .or_else(|| env("TOKEN"))
            .unwrap_or(file.telegram_bot_token);
        if telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token is required (or set TELEGRAM_TOKEN)".into(),
            ));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into(),
            ));
        }

        let admin_ids: HashSet<i64> = match env("ADMIN_IDS") {
            Some(list) => parse_admin_ids(&list)?,
            None => file.admin_ids,
        }
        .into_iter()
        .collect();
        if admin_ids.is_empty() {
            return Err(ConfigError::Validation(
                "admin_ids must contain at least one admin user ID".into(),
            ));
        }

        let timezone_name = env("TIMEZONE")
            .or(file.timezone)
            .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        let timezone: Tz = timezone_name
            .parse()
            .map_err(|_| ConfigError::Validation(format!("unknown timezone '{timezone_name}'")))?;

        let workdays_per_month = match env("WORKDAYS_PER_MONTH") {
            Some(v) => v
                .parse()
                .map_err(|_| ConfigError::Validation(format!("WORKDAYS_PER_MONTH '{v}' is not a number")))?,
            None => file.workdays_per_month.unwrap_or(DEFAULT_WORKDAYS_PER_MONTH),
        };
        if !(1..=31).contains(&workdays_per_month) {
            return Err(ConfigError::Validation(
                "workdays_per_month must be between 1 and 31".into(),
            ));
        }

        let log_chat_id = match env("LOG_CHAT_ID") {
            Some(v) => Some(
                v.parse::<i64>()
                    .map_err(|_| ConfigError::Validation(format!("LOG_CHAT_ID '{v}' is not a chat id")))?,
            ),
            None => file.log_chat_id,
        };

        let data_dir = env("DATA_DIR")
            .or(file.data_dir)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let database_url = env("DATABASE_URL")
            .or(file.database_url)
            .unwrap_or_else(|| format!("sqlite://{}", data_dir.join("driverclock.db").display()));

        Ok(Self {
            telegram_bot_token,
            admin_ids,
            database_url,
            timezone,
            currency: env("CURRENCY")
                .or(file.currency)
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            workdays_per_month,
            log_chat_id: log_chat_id.map(ChatId),
            data_dir,
        })
    }

    pub fn timesheet_config(&self) -> TimesheetConfig {
        TimesheetConfig {
            admin_ids: self.admin_ids.clone(),
            timezone: self.timezone,
            currency: self.currency.clone(),
            workdays_per_month: self.workdays_per_month,
        }
    }
}

/// Parse a comma- or space-separated list of user ids.
pub fn parse_admin_ids(list: &str) -> Result<Vec<i64>, ConfigError> {
    list.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| ConfigError::Validation(format!("admin id '{s}' is not a number")))
        })
        .collect()
}
