//! Telegram client using teloxide.

use teloxide::prelude::*;
use teloxide::types::{BotCommand, FileId, InputFile};
use tracing::{info, warn};

use crate::timesheet::engine::Reply;

/// Telegram API client.
#[derive(Clone)]
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<i64, String> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .await
            .map(|msg| msg.id.0 as i64)
            .map_err(|e| {
                let msg = format!("Failed to send to {chat_id}: {e}");
                warn!("{}", msg);
                msg
            })
    }

    pub async fn send_document(
        &self,
        chat_id: i64,
        file_name: &str,
        bytes: Vec<u8>,
        caption: &str,
    ) -> Result<i64, String> {
        info!("📎 Sending {} ({} bytes) to {}", file_name, bytes.len(), chat_id);
        let file = InputFile::memory(bytes).file_name(file_name.to_string());
        self.bot
            .send_document(ChatId(chat_id), file)
            .caption(caption)
            .await
            .map(|msg| msg.id.0 as i64)
            .map_err(|e| {
                let msg = format!("Failed to send document: {e}");
                warn!("{}", msg);
                msg
            })
    }

    /// Re-send a stored receipt. Receipts are photos or documents; try both.
    pub async fn send_receipt(&self, chat_id: i64, file_id: &str, caption: &str) -> Result<i64, String> {
        let photo = self
            .bot
            .send_photo(ChatId(chat_id), InputFile::file_id(FileId(file_id.to_string())))
            .caption(caption)
            .await;
        match photo {
            Ok(msg) => Ok(msg.id.0 as i64),
            Err(_) => self
                .bot
                .send_document(ChatId(chat_id), InputFile::file_id(FileId(file_id.to_string())))
                .caption(caption)
                .await
                .map(|msg| msg.id.0 as i64)
                .map_err(|e| {
                    let msg = format!("Failed to send receipt {file_id}: {e}");
                    warn!("{}", msg);
                    msg
                }),
        }
    }

    /// Publish the command list shown in Telegram's menu.
    pub async fn set_commands(&self, commands: Vec<BotCommand>) -> Result<(), String> {
        self.bot
            .set_my_commands(commands)
            .await
            .map(|_| ())
            .map_err(|e| format!("Failed to set commands: {e}"))
    }

    /// Send every reply in order. Failures are logged and skipped.
    pub async fn deliver(&self, chat_id: i64, replies: Vec<Reply>) {
        for reply in replies {
            let _ = match reply {
                Reply::Text(text) => self.send_message(chat_id, &text).await,
                Reply::Document { file_name, bytes, caption } => {
                    self.send_document(chat_id, &file_name, bytes, &caption).await
                }
                Reply::Receipt { file_id, caption } => self.send_receipt(chat_id, &file_id, &caption).await,
                Reply::Notify { chat_id: target, text } => self.send_message(target, &text).await,
            };
        }
    }
}
