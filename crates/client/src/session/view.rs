//! Foreground chat view
//!
//! A `ChatView` is what a visible conversation holds on to: one connection
//! manager plus one event loop task that owns the `SessionStore`. Connection
//! events, local actions and the remote typing timer are all handled on that
//! one task, so the store is never shared.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use support_chat_shared::{Message, SessionId};

use super::store::{SessionSnapshot, SessionStore};
use super::typing::TypingDebouncer;
use crate::context::ChatContext;
use crate::error::ClientResult;
use crate::websocket::{
    ConnectionEvent, ConnectionHandle, ConnectionManager, ConnectionOptions, ConnectionState,
    OutboundFrame,
};

/// Local actions forwarded to the event loop
#[derive(Debug)]
enum ViewCommand {
    Input { has_text: bool },
    Send(String),
    ReplaceHistory(Vec<Message>),
    Presence(bool),
}

/// Cloneable way to push counterpart presence into an open view
#[derive(Debug, Clone)]
pub struct PresenceFeed {
    commands: mpsc::UnboundedSender<ViewCommand>,
}

impl PresenceFeed {
    /// Returns false once the view is gone
    pub fn set_online(&self, online: bool) -> bool {
        self.commands.send(ViewCommand::Presence(online)).is_ok()
    }
}

/// An open conversation
///
/// Dropping the view closes its connection and stops its event loop.
pub struct ChatView {
    context: ChatContext,
    session_id: SessionId,
    manager: ConnectionManager,
    connection: ConnectionHandle,
    commands: mpsc::UnboundedSender<ViewCommand>,
    snapshots: watch::Receiver<SessionSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl ChatView {
    /// Load history, then connect
    ///
    /// `online` seeds counterpart presence for admin views; customer views pass `None`.
    pub async fn open(context: &ChatContext, session_id: SessionId, online: Option<bool>) -> Self {
        let history = match context.api.history(&session_id).await {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Failed to load chat history");
                Vec::new()
            }
        };

        let mut store = SessionStore::new(
            session_id.clone(),
            context.self_id.clone(),
            context.timings.typing_expiry,
        );
        if let Some(online) = online {
            store = store.with_presence(online);
        }
        store.load_history(history);

        let (mut manager, events) = ConnectionManager::new(
            Arc::clone(&context.connector),
            ConnectionOptions::foreground(context.api_url.clone(), &context.timings),
        );
        let connection = manager.handle();
        let (snapshot_tx, snapshots) = watch::channel(store.snapshot());
        let (commands, command_rx) = mpsc::unbounded_channel();

        let event_loop = EventLoop {
            store,
            typing: TypingDebouncer::new(context.timings.typing_throttle),
            connection: connection.clone(),
            events,
            commands: command_rx,
            snapshots: snapshot_tx,
            published: None,
        };
        let task = tokio::spawn(event_loop.run());

        manager.open(Some(&session_id), context.auth_token.as_deref());
        tracing::info!(session_id = %session_id, "Chat view opened");

        Self {
            context: context.clone(),
            session_id,
            manager,
            connection,
            commands,
            snapshots,
            task: Some(task),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Follow changes to the session
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.watch_state()
    }

    /// The composer text changed
    pub fn input_changed(&self, text: &str) {
        let _ = self.commands.send(ViewCommand::Input {
            has_text: !text.is_empty(),
        });
    }

    /// Send a message; blank text is ignored
    ///
    /// The message appears in the log only once the server echoes it.
    pub fn send_message(&self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let _ = self.commands.send(ViewCommand::Send(text.to_string()));
    }

    /// Feed for counterpart presence from outside the connection
    pub fn presence_feed(&self) -> PresenceFeed {
        PresenceFeed {
            commands: self.commands.clone(),
        }
    }

    /// Re-fetch history, e.g. to recover messages lost during a reconnect gap
    pub async fn reload_history(&self) -> ClientResult<()> {
        let history = self.context.api.history(&self.session_id).await?;
        let _ = self.commands.send(ViewCommand::ReplaceHistory(history));
        Ok(())
    }

    /// Close the connection and stop the event loop
    pub fn close(&mut self) {
        self.manager.close();
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::info!(session_id = %self.session_id, "Chat view closed");
        }
    }
}

impl Drop for ChatView {
    fn drop(&mut self) {
        self.close();
    }
}

struct EventLoop {
    store: SessionStore,
    typing: TypingDebouncer,
    connection: ConnectionHandle,
    events: mpsc::UnboundedReceiver<ConnectionEvent>,
    commands: mpsc::UnboundedReceiver<ViewCommand>,
    snapshots: watch::Sender<SessionSnapshot>,
    /// Store revision behind the current snapshot
    published: Option<u64>,
}

impl EventLoop {
    async fn run(mut self) {
        loop {
            let typing_deadline = self.store.typing_deadline();
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.on_event(event),
                    None => break,
                },
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },
                _ = sleep_until(typing_deadline.unwrap_or_else(Instant::now)), if typing_deadline.is_some() => {
                    self.store.expire_typing(Instant::now());
                }
            }
            self.publish();
        }
    }

    fn on_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Frame(frame) => {
                if let Some(reply) = self.store.apply(frame, Instant::now()) {
                    self.connection.send(&reply);
                }
            }
            ConnectionEvent::Opened | ConnectionEvent::Closed => {}
        }
    }

    fn on_command(&mut self, command: ViewCommand) {
        let now = Instant::now();
        match command {
            ViewCommand::Input { has_text } => {
                if self.typing.should_emit(has_text, now) {
                    self.connection.send(&OutboundFrame::Typing {
                        is_typing: has_text,
                    });
                }
            }
            ViewCommand::Send(message) => {
                if !self.connection.send(&OutboundFrame::Message { message }) {
                    return;
                }
                self.store.record_send();
                if self.typing.should_emit(false, now) {
                    self.connection
                        .send(&OutboundFrame::Typing { is_typing: false });
                }
            }
            ViewCommand::ReplaceHistory(history) => self.store.load_history(history),
            ViewCommand::Presence(online) => self.store.set_online(online),
        }
    }

    fn publish(&mut self) {
        let revision = self.store.revision();
        if self.published == Some(revision) {
            return;
        }
        self.published = Some(revision);

        let next = self.store.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}
