mod config;
mod error;
mod telegram_log;
mod timesheet;

use std::path::Path;
use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use config::Config;
use timesheet::database::database_path;
use timesheet::{Command, Database, Sender, TelegramClient, TimesheetEngine, parse_command};

struct BotState {
    engine: TimesheetEngine,
    telegram: TelegramClient,
    bot_username: String,
}

fn fatal(msg: String) -> ! {
    eprintln!("❌ {msg}");
    error!("{msg}");
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "driverclock.json".to_string());
    let config = Config::load(&config_path).unwrap_or_else(|e| fatal(e.to_string()));

    let bot = Bot::new(&config.telegram_bot_token);

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("driverclock.log"))
        .unwrap_or_else(|e| fatal(format!("Failed to open log file: {e}")));
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    let registry = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        );

    if let Some(log_chat_id) = config.log_chat_id {
        let tg_layer = telegram_log::TelegramLogLayer::new(bot.clone(), log_chat_id);
        registry.with(tg_layer).init();
    } else {
        registry.init();
    }

    info!("🚀 Starting driverclock...");
    info!("Loaded config from {config_path}");
    info!("Admin IDs: {:?}", config.admin_ids);
    info!("Time zone: {}", config.timezone);

    if let Some(parent) = database_path(&config.database_url).and_then(|p| Path::new(p).parent()) {
        std::fs::create_dir_all(parent).ok();
    }
    let db = Database::open(&config.database_url)
        .unwrap_or_else(|e| fatal(format!("Failed to open database {}: {e}", config.database_url)));

    let bot_username = match bot.get_me().await {
        Ok(me) => {
            info!("Bot user ID: {}, username: @{}", me.id, me.username());
            me.username().to_string()
        }
        Err(e) => {
            warn!("Failed to get bot info: {e}");
            String::new()
        }
    };

    let telegram = TelegramClient::new(bot.clone());
    if let Err(e) = telegram.set_commands(Command::bot_commands()).await {
        warn!("{e}");
    }

    let state = Arc::new(BotState {
        engine: TimesheetEngine::new(config.timesheet_config(), db),
        telegram,
        bot_username,
    });

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn handle_message(msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    // Receipts arrive as photos or documents with the command in the caption
    let Some(text) = msg.text().or_else(|| msg.caption()) else {
        return Ok(());
    };
    let Some(parsed) = parse_command(text, &state.bot_username) else {
        return Ok(());
    };

    let sender = Sender {
        user_id: user.id.0 as i64,
        chat_id: msg.chat.id.0,
        username: user.username.clone(),
        first_name: user.first_name.clone(),
    };
    let role = if state.engine.is_admin(sender.user_id) { "admin" } else { "driver" };

    let replies = match parsed {
        Ok(command) => {
            info!("📨 /{} from {} ({}, {})", command.name(), sender.first_name, sender.user_id, role);
            state.engine.handle(&sender, command, receipt_file_id(&msg), msg.date)
        }
        Err(e) => state.engine.handle_parse_error(&sender, &e),
    };

    state.telegram.deliver(msg.chat.id.0, replies).await;
    Ok(())
}

/// File id of an attached receipt: the largest photo size, or a document.
fn receipt_file_id(msg: &Message) -> Option<String> {
    if let Some(sizes) = msg.photo() {
        return sizes
            .iter()
            .max_by_key(|p| p.width * p.height)
            .map(|p| p.file.id.0.clone());
    }
    msg.document().map(|d| d.file.id.0.clone())
}
