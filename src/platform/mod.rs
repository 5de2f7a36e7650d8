pub mod telegram;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{error, info};

use crate::conversation::ReplyHub;
use crate::flows::Flows;

/// A message received from the chat platform.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub user_id: u64,
    /// Chat the message was posted in; equals the user's DM chat when
    /// `is_direct` is set.
    pub chat_id: i64,
    pub user_name: String,
    /// Whether this came from a private chat with the bot.
    pub is_direct: bool,
    pub text: String,
}

/// Outbound side of the chat platform.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send `text` to the user's private chat with the bot.
    async fn send_direct(&self, user_id: u64, text: &str) -> Result<()>;

    /// Answer in the chat a command was issued from.
    async fn reply(&self, chat_id: i64, text: &str) -> Result<()>;
}

pub const SUPPORT_TICKET: &str = "support_ticket";
pub const UPDATE_TICKET: &str = "update_ticket";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Free-text issue description follows the command.
    SupportTicket { args: String },
    /// Ticket id is read from the raw message text by the flow.
    UpdateTicket,
}

/// Recognise one of the bot's commands. Names are case-sensitive; a
/// trailing `@botname` on the command token is ignored.
pub fn parse_command(text: &str, prefix: &str) -> Option<Command> {
    let trimmed = text.trim_start();
    let (head, rest) = match trimmed.find(char::is_whitespace) {
        Some(pos) => (&trimmed[..pos], &trimmed[pos..]),
        None => (trimmed, ""),
    };

    let name = head.strip_prefix(prefix)?;
    let name = name.split_once('@').map_or(name, |(name, _bot)| name);

    match name {
        SUPPORT_TICKET => Some(Command::SupportTicket {
            args: rest.trim().to_string(),
        }),
        UPDATE_TICKET => Some(Command::UpdateTicket),
        _ => None,
    }
}

/// Everything the update handler needs.
pub struct Handler {
    pub flows: Arc<Flows>,
    pub replies: Arc<ReplyHub>,
    pub command_prefix: String,
}

/// Offer `incoming` to the flow waiting on its author, else start the
/// command it names. Returns `false` when the message was ignored.
pub async fn route(handler: &Handler, incoming: IncomingMessage) -> bool {
    // A waiting flow gets first claim on the user's next message.
    if handler
        .replies
        .deliver(incoming.user_id, &incoming.text)
        .await
    {
        return true;
    }

    let Some(command) = parse_command(&incoming.text, &handler.command_prefix) else {
        return false;
    };

    info!(
        "Command {:?} from {} ({}) in chat {}",
        command, incoming.user_name, incoming.user_id, incoming.chat_id
    );

    // Flows wait on later messages, so they must not hold up the dispatcher.
    let flows = handler.flows.clone();
    tokio::spawn(async move {
        let user_id = incoming.user_id;
        if let Err(e) = flows.run(command, incoming).await {
            error!("Flow for user {} failed: {:#}", user_id, e);
        }
    });
    true
}

/// Split long messages to fit a platform's size limit, preferring line and
/// word boundaries.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        // Walk back to a valid UTF-8 char boundary so slicing doesn't panic
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}
