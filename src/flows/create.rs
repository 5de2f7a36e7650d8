use anyhow::Result;
use tracing::{error, info};

use super::{Flows, Outcome};
use crate::conversation::Session;
use crate::platform::{IncomingMessage, SUPPORT_TICKET, UPDATE_TICKET};
use crate::zendesk::NewTicket;

/// Normalise command arguments into a ticket body: single spaces, no commas.
pub(crate) fn clean_description(args: &str) -> String {
    args.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace(',', "")
}

/// Only an exact (case-insensitive) "yes" confirms.
fn is_confirmation(reply: &str) -> bool {
    reply.to_lowercase() == "yes"
}

impl Flows {
    pub(super) async fn support_ticket(
        &self,
        session: &Session,
        msg: &IncomingMessage,
        args: &str,
    ) -> Result<Outcome> {
        let user_id = msg.user_id;
        let name = &msg.user_name;

        let description = clean_description(args);
        if description.trim().is_empty() {
            self.open_direct(
                msg,
                SUPPORT_TICKET,
                &format!(
                    "Please describe your issue after the command, for example:\n{}{} My node stopped syncing",
                    self.settings.command_prefix, SUPPORT_TICKET
                ),
            )
            .await?;
            return Ok(Outcome::Rejected);
        }

        let greeted = self
            .open_direct(
                msg,
                SUPPORT_TICKET,
                "Hello, I'm the support bot and will help you open a request for the \
                 support team to review and assist you as soon as possible.",
            )
            .await?;
        if !greeted {
            return Ok(Outcome::Rejected);
        }

        let confirmation = match self
            .ask(
                session,
                &format!(
                    "To confirm, you described your issue as: {}\n\nIs that right?",
                    description
                ),
            )
            .await?
        {
            Ok(reply) => reply,
            Err(e) => return self.abandon(session, SUPPORT_TICKET, e).await,
        };

        if !is_confirmation(&confirmation) {
            self.messenger
                .send_direct(
                    user_id,
                    "Okay, please re-enter your issue description if you'd like to open a support ticket.",
                )
                .await?;
            return Ok(Outcome::Declined);
        }

        let subject = match self
            .ask(
                session,
                &format!(
                    "Thanks for confirming that, {}. Please provide a subject for the support ticket:",
                    name
                ),
            )
            .await?
        {
            Ok(reply) => reply,
            Err(e) => return self.abandon(session, SUPPORT_TICKET, e).await,
        };

        let email = if self.settings.collect_email {
            match self
                .ask(
                    session,
                    "Please provide your email address to receive ticket updates:",
                )
                .await?
            {
                Ok(reply) => Some(reply),
                Err(e) => return self.abandon(session, SUPPORT_TICKET, e).await,
            }
        } else {
            None
        };

        let ticket = NewTicket {
            description,
            subject,
            requester_name: name.clone(),
            requester_email: email,
        };

        let ticket_id = match self.tickets.create_ticket(&ticket).await {
            Ok(id) => id,
            Err(e) => {
                error!("Failed to create ticket for user {}: {}", user_id, e);
                self.messenger
                    .send_direct(
                        user_id,
                        &format!(
                            "Sorry, {}, I couldn't create your ticket because the helpdesk \
                             returned an error. Please try again later.",
                            name
                        ),
                    )
                    .await?;
                return Ok(Outcome::CreateFailed);
            }
        };

        // Record before notifying so a failed DM cannot lose ownership.
        if let Err(e) = self.registry.record(ticket_id, user_id).await {
            error!("Failed to record owner of ticket #{}: {:#}", ticket_id, e);
        }
        info!("Ticket #{} opened by user {}", ticket_id, user_id);

        self.messenger
            .send_direct(
                user_id,
                &format!(
                    "All right, {}, I have created a new ticket for you and the support team \
                     will begin reviewing your issue and get back to you soon.",
                    name
                ),
            )
            .await?;

        let follow_up = if ticket.requester_email.is_some() {
            "You can check for updates to the ticket from the support team directly to your email address."
                .to_string()
        } else {
            format!(
                "Send {}{} {} here to add more details.",
                self.settings.command_prefix, UPDATE_TICKET, ticket_id
            )
        };
        self.messenger
            .send_direct(
                user_id,
                &format!("The new ticket ID is {}. {}", ticket_id, follow_up),
            )
            .await?;

        Ok(Outcome::Created(ticket_id))
    }
}
