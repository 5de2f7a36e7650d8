//! Fakes shared by the unit tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::{Json, Router};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::conversation::ReplyHub;
use crate::flows::{FlowSettings, Flows, Outcome};
use crate::platform::{Command, Handler, IncomingMessage, Messenger};
use crate::registry::InMemoryRegistry;
use crate::zendesk::{NewTicket, TicketBackend, TicketError};

/// Feed `text` to the flow waiting on `user_id`, retrying until it asks.
pub async fn answer(replies: &ReplyHub, user_id: u64, text: &str) {
    for _ in 0..400 {
        if replies.deliver(user_id, text).await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("user {user_id} was never asked for a reply (wanted to send {text:?})");
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Sent {
    Direct(u64, String),
    Reply(i64, String),
}

#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<Sent>>,
    refuse_direct: bool,
}

impl RecordingMessenger {
    /// Fails every DM the way Telegram does for users who never opened a
    /// private chat with the bot.
    pub fn refusing_direct() -> Self {
        Self {
            refuse_direct: true,
            ..Default::default()
        }
    }

    pub async fn direct_to(&self, user_id: u64) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter_map(|s| match s {
                Sent::Direct(to, text) if *to == user_id => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn replies_in(&self, chat_id: i64) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter_map(|s| match s {
                Sent::Reply(chat, text) if *chat == chat_id => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_direct(&self, user_id: u64, text: &str) -> Result<()> {
        if self.refuse_direct {
            anyhow::bail!("Forbidden: bot can't initiate conversation with a user");
        }
        self.sent
            .lock()
            .await
            .push(Sent::Direct(user_id, text.to_string()));
        Ok(())
    }

    async fn reply(&self, chat_id: i64, text: &str) -> Result<()> {
        self.sent
            .lock()
            .await
            .push(Sent::Reply(chat_id, text.to_string()));
        Ok(())
    }
}

/// Ticket backend with canned results; errors are given as HTTP statuses.
pub struct ScriptedBackend {
    create_result: Mutex<Result<u64, u16>>,
    comment_result: Mutex<Result<(), u16>>,
    created: Mutex<Vec<NewTicket>>,
    comments: Mutex<Vec<(u64, String)>>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self {
            create_result: Mutex::new(Ok(1)),
            comment_result: Mutex::new(Ok(())),
            created: Mutex::new(Vec::new()),
            comments: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedBackend {
    pub async fn create_returns(&self, result: Result<u64, u16>) {
        *self.create_result.lock().await = result;
    }

    pub async fn comment_returns(&self, result: Result<(), u16>) {
        *self.comment_result.lock().await = result;
    }

    pub async fn created(&self) -> Vec<NewTicket> {
        self.created.lock().await.clone()
    }

    pub async fn comments(&self) -> Vec<(u64, String)> {
        self.comments.lock().await.clone()
    }
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).expect("valid status code")
}

#[async_trait]
impl TicketBackend for ScriptedBackend {
    async fn create_ticket(&self, ticket: &NewTicket) -> Result<u64, TicketError> {
        self.created.lock().await.push(ticket.clone());
        match *self.create_result.lock().await {
            Ok(id) => Ok(id),
            Err(code) => Err(TicketError::CreateRejected {
                status: status(code),
                body: String::new(),
            }),
        }
    }

    async fn add_comment(&self, ticket_id: u64, body: &str) -> Result<(), TicketError> {
        self.comments
            .lock()
            .await
            .push((ticket_id, body.to_string()));
        match *self.comment_result.lock().await {
            Ok(()) => Ok(()),
            Err(code) => Err(TicketError::CommentRejected {
                ticket_id,
                status: status(code),
                body: String::new(),
            }),
        }
    }
}

/// Flows wired to fakes.
pub struct Harness {
    pub messenger: Arc<RecordingMessenger>,
    pub backend: Arc<ScriptedBackend>,
    pub registry: Arc<InMemoryRegistry>,
    pub replies: Arc<ReplyHub>,
    pub flows: Arc<Flows>,
}

impl Harness {
    pub fn new(collect_email: bool, check_ownership: bool) -> Self {
        Self::with_messenger(RecordingMessenger::default(), collect_email, check_ownership)
    }

    /// A harness whose users have never opened a private chat with the bot.
    pub fn without_dms() -> Self {
        Self::with_messenger(RecordingMessenger::refusing_direct(), true, true)
    }

    fn with_messenger(
        messenger: RecordingMessenger,
        collect_email: bool,
        check_ownership: bool,
    ) -> Self {
        let messenger = Arc::new(messenger);
        let backend = Arc::new(ScriptedBackend::default());
        let registry = Arc::new(InMemoryRegistry::new());
        let replies = Arc::new(ReplyHub::new(Some(Duration::from_secs(5))));
        let flows = Arc::new(Flows::new(
            messenger.clone(),
            backend.clone(),
            registry.clone(),
            replies.clone(),
            FlowSettings {
                collect_email,
                check_ownership,
                command_prefix: "/".into(),
            },
        ));
        Self {
            messenger,
            backend,
            registry,
            replies,
            flows,
        }
    }

    /// The message router the Telegram dispatcher uses, over these fakes.
    pub fn handler(&self) -> Handler {
        Handler {
            flows: self.flows.clone(),
            replies: self.replies.clone(),
            command_prefix: "/".into(),
        }
    }

    fn spawn(&self, command: Command, msg: IncomingMessage) -> JoinHandle<Result<Outcome>> {
        let flows = self.flows.clone();
        tokio::spawn(async move { flows.run(command, msg).await })
    }

    pub fn spawn_support_ticket(
        &self,
        user_id: u64,
        user_name: &str,
        args: &str,
    ) -> JoinHandle<Result<Outcome>> {
        self.spawn(
            Command::SupportTicket {
                args: args.to_string(),
            },
            IncomingMessage {
                user_id,
                chat_id: user_id as i64,
                user_name: user_name.to_string(),
                is_direct: true,
                text: format!("/support_ticket {args}"),
            },
        )
    }

    pub fn spawn_update_ticket(&self, user_id: u64, text: &str) -> JoinHandle<Result<Outcome>> {
        self.spawn(
            Command::UpdateTicket,
            IncomingMessage {
                user_id,
                chat_id: user_id as i64,
                user_name: "Tester".into(),
                is_direct: true,
                text: text.to_string(),
            },
        )
    }

    pub fn spawn_in_group(
        &self,
        command: Command,
        user_id: u64,
        chat_id: i64,
        text: &str,
    ) -> JoinHandle<Result<Outcome>> {
        self.spawn(
            command,
            IncomingMessage {
                user_id,
                chat_id,
                user_name: "Tester".into(),
                is_direct: false,
                text: text.to_string(),
            },
        )
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub body: Value,
}

struct MockState {
    status: StatusCode,
    body: Value,
    calls: Mutex<Vec<RecordedCall>>,
}

/// Local HTTP server standing in for Zendesk: answers every request with a
/// fixed status and JSON body, and records what it was sent.
pub struct MockZendesk {
    addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockZendesk {
    pub async fn start(status_code: u16, body: Value) -> Self {
        let state = Arc::new(MockState {
            status: status(status_code),
            body,
            calls: Mutex::new(Vec::new()),
        });
        let app = Router::new().fallback(record).with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock server");
        let addr = listener.local_addr().expect("mock server address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock server");
        });

        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.state.calls.lock().await.clone()
    }
}

async fn record(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let call = RecordedCall {
        method: method.to_string(),
        path: uri.path().to_string(),
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from),
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    };
    state.calls.lock().await.push(call);
    (state.status, Json(state.body.clone()))
}
