//! Background unread listener
//!
//! While no chat view is open, a passive connection counts incoming messages
//! from the other side so an entry point can show a badge. It never sends a
//! read marker and ignores control frames.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use support_chat_shared::SessionId;

use crate::context::ChatContext;
use crate::websocket::{ConnectionEvent, ConnectionManager, ConnectionOptions, InboundFrame};

/// Unread message badge
///
/// Only ever incremented by a listener and reset when a view takes over.
#[derive(Debug, Clone)]
pub struct UnreadCounter {
    value: Arc<watch::Sender<u64>>,
}

impl UnreadCounter {
    pub fn new() -> Self {
        let (value, _) = watch::channel(0);
        Self {
            value: Arc::new(value),
        }
    }

    pub fn get(&self) -> u64 {
        *self.value.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.value.subscribe()
    }

    fn increment(&self) -> u64 {
        let mut count = 0;
        self.value.send_modify(|value| {
            *value += 1;
            count = *value;
        });
        count
    }

    pub fn reset(&self) {
        self.value.send_replace(0);
    }
}

impl Default for UnreadCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Passive connection that feeds an `UnreadCounter`
pub struct PresenceListener {
    session_id: SessionId,
    manager: ConnectionManager,
    task: Option<JoinHandle<()>>,
}

impl PresenceListener {
    /// Connect to the session and start counting
    pub fn start(context: &ChatContext, session_id: SessionId, unread: UnreadCounter) -> Self {
        let (mut manager, mut events) = ConnectionManager::new(
            Arc::clone(&context.connector),
            ConnectionOptions::background(context.api_url.clone(), &context.timings),
        );

        let self_id = context.self_id.clone();
        let log_session = session_id.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let ConnectionEvent::Frame(InboundFrame::Chat(message)) = event else {
                    continue;
                };
                if message.sender_id != self_id {
                    let unread = unread.increment();
                    tracing::debug!(session_id = %log_session, unread, "Unread message counted");
                }
            }
        });

        manager.open(Some(&session_id), context.auth_token.as_deref());
        tracing::debug!(session_id = %session_id, "Background listener started");

        Self {
            session_id,
            manager,
            task: Some(task),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Close the connection and wait until no further message can be counted
    pub async fn stop(mut self) {
        self.manager.close();
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
        tracing::debug!(session_id = %self.session_id, "Background listener stopped");
    }
}

impl Drop for PresenceListener {
    fn drop(&mut self) {
        self.manager.close();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
