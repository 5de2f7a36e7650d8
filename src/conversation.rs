//! Waiting for the next message from a user in the middle of a flow.
//!
//! Every command invocation opens a [`Session`]. When a flow needs an answer
//! it subscribes through [`ReplyHub::subscribe`] before prompting and then
//! waits with [`ReplyHub::wait`]; the transport offers each incoming message
//! to [`ReplyHub::deliver`] before treating it as a command. A user has at most one live subscription: a newer one replaces
//! the older, whose flow then ends with [`WaitError::Superseded`].

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WaitError {
    #[error("no reply within {0:?}")]
    TimedOut(Duration),

    #[error("conversation cancelled")]
    Cancelled,

    #[error("superseded by a newer conversation")]
    Superseded,
}

/// One command invocation's conversation with one user.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub user_id: u64,
    cancel: CancellationToken,
}

impl Session {
    #[cfg(test)]
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// A pending claim on a user's next message, from [`ReplyHub::subscribe`].
pub struct Subscription {
    rx: oneshot::Receiver<String>,
}

struct Waiter {
    session_id: Uuid,
    tx: oneshot::Sender<String>,
}

pub struct ReplyHub {
    waiters: Mutex<HashMap<u64, Waiter>>,
    timeout: Option<Duration>,
    shutdown: CancellationToken,
}

impl ReplyHub {
    /// `timeout` bounds each individual wait; `None` waits until a reply or
    /// cancellation.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            waiters: Mutex::new(HashMap::new()),
            timeout,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn open_session(&self, user_id: u64) -> Session {
        Session {
            id: Uuid::new_v4(),
            user_id,
            cancel: self.shutdown.child_token(),
        }
    }

    /// Register `session` as the taker of its user's next message. Do this
    /// before prompting so an immediate answer is not lost.
    pub async fn subscribe(&self, session: &Session) -> Subscription {
        let (tx, rx) = oneshot::channel();
        let mut waiters = self.waiters.lock().await;
        let previous = waiters.insert(
            session.user_id,
            Waiter {
                session_id: session.id,
                tx,
            },
        );
        if let Some(previous) = previous {
            debug!(
                "Session {} replaces waiting session {} for user {}",
                session.id, previous.session_id, session.user_id
            );
        }
        Subscription { rx }
    }

    /// Suspend until the subscribed user sends another message.
    pub async fn wait(
        &self,
        session: &Session,
        subscription: Subscription,
    ) -> Result<String, WaitError> {
        let result = tokio::select! {
            biased;
            _ = session.cancel.cancelled() => Err(WaitError::Cancelled),
            reply = Self::recv(subscription.rx, self.timeout) => reply,
        };

        if result.is_err() {
            self.unsubscribe(session).await;
        }
        result
    }

    #[cfg(test)]
    pub async fn wait_for_reply(&self, session: &Session) -> Result<String, WaitError> {
        let subscription = self.subscribe(session).await;
        self.wait(session, subscription).await
    }

    async fn recv(
        rx: oneshot::Receiver<String>,
        timeout: Option<Duration>,
    ) -> Result<String, WaitError> {
        let received = match timeout {
            Some(limit) => tokio::time::timeout(limit, rx)
                .await
                .map_err(|_| WaitError::TimedOut(limit))?,
            None => rx.await,
        };
        received.map_err(|_| WaitError::Superseded)
    }

    /// Drop `session`'s subscription unless a newer one already replaced it.
    pub async fn unsubscribe(&self, session: &Session) {
        let mut waiters = self.waiters.lock().await;
        if waiters
            .get(&session.user_id)
            .is_some_and(|w| w.session_id == session.id)
        {
            waiters.remove(&session.user_id);
        }
    }

    /// Hand `text` to the flow waiting on `user_id`. Returns `false` when no
    /// flow is waiting, in which case the message should be handled normally.
    pub async fn deliver(&self, user_id: u64, text: &str) -> bool {
        let waiter = self.waiters.lock().await.remove(&user_id);
        match waiter {
            Some(waiter) => waiter.tx.send(text.to_string()).is_ok(),
            None => false,
        }
    }

    #[cfg(test)]
    pub async fn is_waiting(&self, user_id: u64) -> bool {
        self.waiters.lock().await.contains_key(&user_id)
    }

    /// Cancel every open session.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
