mod config;
mod conversation;
mod flows;
mod platform;
mod registry;
#[cfg(test)]
mod testing;
mod zendesk;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::Bot;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use crate::config::{Config, LoggingConfig};
use crate::conversation::ReplyHub;
use crate::flows::{FlowSettings, Flows};
use crate::platform::telegram::{self, TelegramMessenger};
use crate::platform::Handler;
use crate::registry::InMemoryRegistry;
use crate::zendesk::ZendeskClient;

/// Console logging always; with a log directory, also a daily file of
/// everything and a daily file of errors only.
fn init_logging(logging: &LoggingConfig) -> Result<Vec<WorkerGuard>> {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info,deskbot=debug".into())
    };

    let mut guards = Vec::new();
    let mut layers = vec![tracing_subscriber::fmt::layer()
        .with_filter(filter())
        .boxed()];

    if let Some(dir) = &logging.directory {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

        let all = tracing_appender::rolling::daily(dir, format!("{}.log", logging.file_prefix));
        let (all, guard) = tracing_appender::non_blocking(all);
        guards.push(guard);
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(all)
                .with_filter(filter())
                .boxed(),
        );

        let errors =
            tracing_appender::rolling::daily(dir, format!("{}_err.log", logging.file_prefix));
        let (errors, guard) = tracing_appender::non_blocking(errors);
        guards.push(guard);
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(errors)
                .with_filter(LevelFilter::ERROR)
                .boxed(),
        );
    }

    tracing_subscriber::registry().with(layers).init();
    Ok(guards)
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let _guards = init_logging(&config.logging)?;

    if let Err(e) = dotenv {
        if !e.not_found() {
            warn!("Ignoring unreadable .env file: {}", e);
        }
    }

    info!("Configuration loaded from: {}", config_path.display());
    info!("  Zendesk: {}", config.zendesk.effective_base_url());
    info!("  Command prefix: {}", config.telegram.command_prefix);
    info!("  Collect email: {}", config.flows.collect_email);
    info!("  Check ownership: {}", config.flows.check_ownership);
    match config.flows.reply_timeout() {
        Some(timeout) => info!("  Reply timeout: {}s", timeout.as_secs()),
        None => info!("  Reply timeout: none"),
    }

    let zendesk = ZendeskClient::new(&config.zendesk).context("Failed to build Zendesk client")?;

    let bot = Bot::new(&config.telegram.bot_token);
    let replies = Arc::new(ReplyHub::new(config.flows.reply_timeout()));
    let flows = Arc::new(Flows::new(
        Arc::new(TelegramMessenger::new(bot.clone())),
        Arc::new(zendesk),
        Arc::new(InMemoryRegistry::new()),
        replies.clone(),
        FlowSettings::from_config(&config.flows, &config.telegram.command_prefix),
    ));

    let handler = Arc::new(Handler {
        flows,
        replies,
        command_prefix: config.telegram.command_prefix.clone(),
    });

    info!("Bot is starting...");
    telegram::run(bot, handler, config.telegram.home_chat_id).await?;

    Ok(())
}
