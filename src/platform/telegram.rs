use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use teloxide::prelude::*;
use tracing::{info, warn};

use crate::platform::{route, split_message, Handler, IncomingMessage, Messenger};

/// Telegram rejects messages longer than 4096 characters.
const MAX_MESSAGE_LEN: usize = 4000;

/// [`Messenger`] backed by the Telegram Bot API.
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    async fn send(&self, chat_id: ChatId, text: &str) -> Result<()> {
        for chunk in split_message(text, MAX_MESSAGE_LEN) {
            self.bot.send_message(chat_id, chunk).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_direct(&self, user_id: u64, text: &str) -> Result<()> {
        self.send(ChatId::from(UserId(user_id)), text).await
    }

    async fn reply(&self, chat_id: i64, text: &str) -> Result<()> {
        self.send(ChatId(chat_id), text).await
    }
}

/// Run the Telegram bot until Ctrl-C.
pub async fn run(bot: Bot, handler: Arc<Handler>, home_chat_id: Option<i64>) -> Result<()> {
    let me = bot.get_me().await?;
    info!(
        "Connected to Telegram as @{}",
        me.user.username.as_deref().unwrap_or("<unnamed>")
    );

    if let Some(chat_id) = home_chat_id {
        match bot.get_chat(ChatId(chat_id)).await {
            Ok(_) => info!("Home chat {} is reachable", chat_id),
            Err(e) => warn!("Home chat {} is not reachable: {}", chat_id, e),
        }
    }

    let replies = handler.replies.clone();
    let tree = Update::filter_message().endpoint(handle_message);

    Dispatcher::builder(bot, tree)
        .dependencies(dptree::deps![handler])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Dispatcher stopped, cancelling open conversations");
    replies.shutdown();
    Ok(())
}

async fn handle_message(msg: Message, handler: Arc<Handler>) -> ResponseResult<()> {
    let user = match msg.from.as_ref() {
        Some(user) => user,
        None => return Ok(()),
    };

    let text = match msg.text() {
        Some(t) => t.to_string(),
        None => return Ok(()),
    };

    let incoming = IncomingMessage {
        user_id: user.id.0,
        chat_id: msg.chat.id.0,
        user_name: user.full_name(),
        is_direct: msg.chat.is_private(),
        text,
    };

    route(&handler, incoming).await;
    Ok(())
}
