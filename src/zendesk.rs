use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::ZendeskConfig;

/// A ticket about to be opened on behalf of a chat user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTicket {
    pub description: String,
    pub subject: String,
    pub requester_name: String,
    pub requester_email: Option<String>,
}

#[derive(Debug, Error)]
pub enum TicketError {
    #[error("request to Zendesk failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Zendesk rejected ticket creation ({status}): {body}")]
    CreateRejected { status: StatusCode, body: String },

    #[error("Zendesk rejected comment on ticket #{ticket_id} ({status}): {body}")]
    CommentRejected {
        ticket_id: u64,
        status: StatusCode,
        body: String,
    },

    #[error("unexpected Zendesk response: {0}")]
    MalformedResponse(String),
}

/// Outbound operations against the helpdesk.
#[async_trait]
pub trait TicketBackend: Send + Sync {
    /// Open a ticket and return its id.
    async fn create_ticket(&self, ticket: &NewTicket) -> Result<u64, TicketError>;

    /// Append a public comment to an existing ticket.
    async fn add_comment(&self, ticket_id: u64, body: &str) -> Result<(), TicketError>;
}

#[derive(Debug, Serialize)]
struct RequestEnvelope<'a> {
    request: RequestBody<'a>,
}

#[derive(Debug, Serialize)]
struct RequestBody<'a> {
    comment: Comment<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    requester: Option<Requester<'a>>,
}

#[derive(Debug, Serialize)]
struct Comment<'a> {
    body: &'a str,
}

#[derive(Debug, Serialize)]
struct Requester<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CreatedEnvelope {
    request: CreatedRequest,
}

#[derive(Debug, Deserialize)]
struct CreatedRequest {
    id: u64,
}

/// Client for the Zendesk Requests API, authenticated with an agent email
/// and API token.
pub struct ZendeskClient {
    client: reqwest::Client,
    base_url: String,
    email: String,
    api_token: String,
}

impl ZendeskClient {
    pub fn new(config: &ZendeskConfig) -> Result<Self, TicketError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.effective_base_url(),
            email: config.email.clone(),
            api_token: config.api_token.clone(),
        })
    }

    /// API-token auth logs in as `{email}/token`; accept emails that already
    /// carry the suffix.
    fn auth_user(&self) -> String {
        if self.email.ends_with("/token") {
            self.email.clone()
        } else {
            format!("{}/token", self.email)
        }
    }
}

#[async_trait]
impl TicketBackend for ZendeskClient {
    async fn create_ticket(&self, ticket: &NewTicket) -> Result<u64, TicketError> {
        let url = format!("{}/api/v2/requests.json", self.base_url);
        let body = RequestEnvelope {
            request: RequestBody {
                comment: Comment {
                    body: &ticket.description,
                },
                subject: Some(ticket.subject.as_str()),
                requester: Some(Requester {
                    name: &ticket.requester_name,
                    email: ticket.requester_email.as_deref(),
                }),
            },
        };

        debug!("Creating Zendesk request: {}", url);

        let response = self
            .client
            .post(&url)
            .basic_auth(self.auth_user(), Some(&self.api_token))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            return Err(TicketError::CreateRejected { status, body });
        }

        let created: CreatedEnvelope = response
            .json()
            .await
            .map_err(|e| TicketError::MalformedResponse(e.to_string()))?;

        info!("Created Zendesk ticket #{}", created.request.id);
        Ok(created.request.id)
    }

    async fn add_comment(&self, ticket_id: u64, body: &str) -> Result<(), TicketError> {
        let url = format!("{}/api/v2/requests/{}.json", self.base_url, ticket_id);
        let payload = RequestEnvelope {
            request: RequestBody {
                comment: Comment { body },
                subject: None,
                requester: None,
            },
        };

        debug!("Updating Zendesk request: {}", url);

        let response = self
            .client
            .put(&url)
            .basic_auth(self.auth_user(), Some(&self.api_token))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            error!("Failed to update comment on ticket #{}: {}", ticket_id, status);
            return Err(TicketError::CommentRejected {
                ticket_id,
                status,
                body,
            });
        }

        info!("Comment added to ticket #{}", ticket_id);
        Ok(())
    }
}
