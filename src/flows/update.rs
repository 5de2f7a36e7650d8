use anyhow::Result;
use tracing::{error, warn};

use super::{Flows, Outcome};
use crate::conversation::Session;
use crate::platform::{IncomingMessage, UPDATE_TICKET};

/// Ticket id is the second whitespace-separated token of the raw text.
pub(crate) fn parse_ticket_id(text: &str) -> Option<u64> {
    text.split_whitespace().nth(1)?.parse().ok()
}

impl Flows {
    pub(super) async fn update_ticket(
        &self,
        session: &Session,
        msg: &IncomingMessage,
    ) -> Result<Outcome> {
        if !msg.is_direct {
            self.messenger
                .reply(msg.chat_id, "This command can only be used in DMs.")
                .await?;
            return Ok(Outcome::Rejected);
        }

        let Some(ticket_id) = parse_ticket_id(&msg.text) else {
            self.messenger
                .reply(msg.chat_id, "Please provide a valid ticket ID.")
                .await?;
            return Ok(Outcome::Rejected);
        };

        if self.settings.check_ownership && !self.owns(ticket_id, msg.user_id).await {
            self.messenger
                .reply(
                    msg.chat_id,
                    &format!(
                        "Ticket #{} was not opened by you, so you can't update it here.",
                        ticket_id
                    ),
                )
                .await?;
            return Ok(Outcome::Rejected);
        }

        let update = match self
            .ask(
                session,
                &format!(
                    "You have requested to update support ticket #{}. Please provide your update:",
                    ticket_id
                ),
            )
            .await?
        {
            Ok(reply) => reply,
            Err(e) => return self.abandon(session, UPDATE_TICKET, e).await,
        };

        match self.tickets.add_comment(ticket_id, &update).await {
            Ok(()) => {
                self.messenger
                    .send_direct(msg.user_id, "Your update has been added to the support ticket.")
                    .await?;
                Ok(Outcome::Updated(ticket_id))
            }
            Err(e) => {
                error!("Failed to update ticket #{}: {}", ticket_id, e);
                self.messenger
                    .send_direct(
                        msg.user_id,
                        "An error occurred while updating the support ticket. Please try again later.",
                    )
                    .await?;
                Ok(Outcome::UpdateFailed(ticket_id))
            }
        }
    }

    async fn owns(&self, ticket_id: u64, user_id: u64) -> bool {
        match self.registry.owner(ticket_id).await {
            Ok(owner) => owner == Some(user_id),
            Err(e) => {
                warn!("Ownership lookup for ticket #{} failed: {:#}", ticket_id, e);
                false
            }
        }
    }
}
