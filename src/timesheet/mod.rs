//! Timesheet module - driver attendance, claims and balances over Telegram.

pub mod attendance;
pub mod commands;
pub mod database;
pub mod engine;
pub mod ledger;
pub mod money;
pub mod pdf;
pub mod report;
pub mod telegram;

#[cfg(test)]
mod tests;

pub use commands::{Command, parse_command};
pub use database::Database;
pub use engine::{Sender, TimesheetConfig, TimesheetEngine};
pub use telegram::TelegramClient;
