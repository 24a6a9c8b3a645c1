use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ChatId;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

const FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const MAX_BUFFERED: usize = 50;
const MAX_MESSAGE_CHARS: usize = 4000;

/// Forwards WARN and ERROR events to an admin chat, batched.
pub struct TelegramLogLayer {
    tx: mpsc::UnboundedSender<String>,
}

impl TelegramLogLayer {
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            let mut buffer: Vec<String> = Vec::new();
            let mut interval = tokio::time::interval(FLUSH_INTERVAL);

            loop {
                tokio::select! {
                    msg = rx.recv() => {
                        match msg {
                            Some(line) => {
                                buffer.push(line);
                                if buffer.len() >= MAX_BUFFERED {
                                    flush_buffer(&bot, chat_id, &mut buffer).await;
                                }
                            }
                            None => {
                                flush_buffer(&bot, chat_id, &mut buffer).await;
                                break;
                            }
                        }
                    }
                    _ = interval.tick() => {
                        flush_buffer(&bot, chat_id, &mut buffer).await;
                    }
                }
            }
        });

        Self { tx }
    }
}

async fn flush_buffer(bot: &Bot, chat_id: ChatId, buffer: &mut Vec<String>) {
    for text in batch_lines(std::mem::take(buffer)) {
        if let Err(e) = bot.send_message(chat_id, &text).await {
            eprintln!("Failed to send log to Telegram: {e}");
        }
    }
}

/// Join log lines into messages under Telegram's size limit.
fn batch_lines(lines: Vec<String>) -> Vec<String> {
    let mut messages = Vec::new();
    let mut current = String::new();
    for line in lines {
        let line: String = line.chars().take(MAX_MESSAGE_CHARS).collect();
        if !current.is_empty() && current.chars().count() + line.chars().count() + 1 > MAX_MESSAGE_CHARS {
            messages.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(&line);
    }
    if !current.is_empty() {
        messages.push(current);
    }
    messages
}

/// The forwarded text for an event, or `None` below WARN.
fn format_event(level: Level, target: &str, message: &str) -> Option<String> {
    match level {
        Level::ERROR => Some(format!("❌ [{target}] {message}")),
        Level::WARN => Some(format!("⚠️ [{target}] {message}")),
        _ => None,
    }
}

struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else if self.message.is_empty() {
            self.message = format!("{} = {:?}", field.name(), value);
        } else {
            self.message
                .push_str(&format!(", {} = {:?}", field.name(), value));
        }
    }
}

impl<S: Subscriber> Layer<S> for TelegramLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        // Our own send failures must not loop back into the channel
        if metadata.target().starts_with("teloxide") || metadata.target().starts_with("reqwest") {
            return;
        }

        let mut visitor = MessageVisitor {
            message: String::new(),
        };
        event.record(&mut visitor);

        let Some(text) = format_event(*metadata.level(), metadata.target(), &visitor.message) else {
            return;
        };
        if self.tx.send(text).is_err() {
            eprintln!("Log channel closed, message dropped");
        }
    }
}
