//! Scripted conversations behind the bot's two commands.

mod create;
mod update;

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn, Instrument};

use crate::config::FlowConfig;
use crate::conversation::{ReplyHub, Session, WaitError};
use crate::platform::{Command, IncomingMessage, Messenger};
use crate::registry::TicketRegistry;
use crate::zendesk::TicketBackend;

/// Switches reconciling the historical variants of the bot.
#[derive(Debug, Clone)]
pub struct FlowSettings {
    pub collect_email: bool,
    pub check_ownership: bool,
    /// Shown to users when telling them how to run a command.
    pub command_prefix: String,
}

impl FlowSettings {
    pub fn from_config(flows: &FlowConfig, command_prefix: &str) -> Self {
        Self {
            collect_email: flows.collect_email,
            check_ownership: flows.check_ownership,
            command_prefix: command_prefix.to_string(),
        }
    }
}

/// How a flow ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Created(u64),
    CreateFailed,
    /// The user did not confirm the description.
    Declined,
    Updated(u64),
    UpdateFailed(u64),
    /// Stopped before any backend call: wrong chat, bad id, not the owner,
    /// or nothing to submit.
    Rejected,
    /// The user never answered, or the conversation was cancelled.
    Abandoned(WaitError),
}

/// Application context shared by every flow.
pub struct Flows {
    messenger: Arc<dyn Messenger>,
    tickets: Arc<dyn TicketBackend>,
    registry: Arc<dyn TicketRegistry>,
    replies: Arc<ReplyHub>,
    settings: FlowSettings,
}

impl Flows {
    pub fn new(
        messenger: Arc<dyn Messenger>,
        tickets: Arc<dyn TicketBackend>,
        registry: Arc<dyn TicketRegistry>,
        replies: Arc<ReplyHub>,
        settings: FlowSettings,
    ) -> Self {
        Self {
            messenger,
            tickets,
            registry,
            replies,
            settings,
        }
    }

    /// Run the flow for `command` to completion.
    pub async fn run(&self, command: Command, msg: IncomingMessage) -> Result<Outcome> {
        let session = self.replies.open_session(msg.user_id);
        let (name, outcome) = match command {
            Command::SupportTicket { args } => {
                let span = tracing::info_span!(
                    "support_ticket",
                    session = %session.id,
                    user = msg.user_id
                );
                let outcome = self
                    .support_ticket(&session, &msg, &args)
                    .instrument(span)
                    .await?;
                ("support_ticket", outcome)
            }
            Command::UpdateTicket => {
                let span = tracing::info_span!(
                    "update_ticket",
                    session = %session.id,
                    user = msg.user_id
                );
                let outcome = self.update_ticket(&session, &msg).instrument(span).await?;
                ("update_ticket", outcome)
            }
        };
        info!("{} for user {} finished: {:?}", name, msg.user_id, outcome);
        Ok(outcome)
    }

    /// Prompt the user and wait for their answer.
    async fn ask(&self, session: &Session, prompt: &str) -> Result<Result<String, WaitError>> {
        let subscription = self.replies.subscribe(session).await;
        if let Err(e) = self.messenger.send_direct(session.user_id, prompt).await {
            self.replies.unsubscribe(session).await;
            return Err(e);
        }
        Ok(self.replies.wait(session, subscription).await)
    }

    /// Send the first DM of a flow. Telegram refuses to DM users who never
    /// started a private chat with the bot; when the command came from a
    /// group, say so there and return `false`.
    async fn open_direct(
        &self,
        msg: &IncomingMessage,
        command: &str,
        text: &str,
    ) -> Result<bool> {
        match self.messenger.send_direct(msg.user_id, text).await {
            Ok(()) => Ok(true),
            Err(e) if !msg.is_direct => {
                warn!("Cannot DM user {}: {:#}", msg.user_id, e);
                self.messenger
                    .reply(
                        msg.chat_id,
                        &format!(
                            "{}, I can't message you privately yet. Please open a private \
                             chat with me, then run {}{} again.",
                            msg.user_name, self.settings.command_prefix, command
                        ),
                    )
                    .await?;
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Tell the user why a conversation stopped, where that is useful.
    async fn abandon(&self, session: &Session, command: &str, err: WaitError) -> Result<Outcome> {
        info!("Conversation {} ended without a reply: {}", session.id, err);
        if let WaitError::TimedOut(_) = err {
            self.messenger
                .send_direct(
                    session.user_id,
                    &format!(
                        "I didn't hear back from you, so I've closed this request. \
                         Run {}{} again whenever you're ready.",
                        self.settings.command_prefix, command
                    ),
                )
                .await?;
        }
        Ok(Outcome::Abandoned(err))
    }
}
