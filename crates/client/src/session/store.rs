//! Per-session chat state
//!
//! The message log only grows from frames received on the connection. A
//! locally sent message shows up once the server echoes it back.

use std::time::Duration;

use tokio::time::Instant;

use support_chat_shared::{Message, SessionId, UserId};

use crate::websocket::{InboundFrame, OutboundFrame};

/// Point-in-time view of a session, as rendered by a chat view
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub messages: Vec<Message>,
    /// The other side's read marker arrived after my last send
    pub all_read: bool,
    pub remote_typing: bool,
    /// Counterpart presence; only tracked by admin views
    pub online: Option<bool>,
}

/// In-memory state of one chat session
#[derive(Debug, Clone)]
pub struct SessionStore {
    session_id: SessionId,
    self_id: UserId,
    messages: Vec<Message>,
    all_read: bool,
    remote_typing: bool,
    typing_expiry: Duration,
    typing_deadline: Option<Instant>,
    online: Option<bool>,
    /// Bumped on every mutation
    revision: u64,
}

impl SessionStore {
    pub fn new(session_id: SessionId, self_id: UserId, typing_expiry: Duration) -> Self {
        Self {
            session_id,
            self_id,
            messages: Vec::new(),
            all_read: false,
            remote_typing: false,
            typing_expiry,
            typing_deadline: None,
            online: None,
            revision: 0,
        }
    }

    /// Track counterpart presence, starting from a known value
    pub fn with_presence(mut self, online: bool) -> Self {
        self.online = Some(online);
        self
    }

    /// Replace the log with history fetched over REST
    pub fn load_history(&mut self, history: Vec<Message>) {
        self.messages = history;
        self.revision += 1;
    }

    /// Overwrite counterpart presence with the directory's latest value
    ///
    /// Ignored when presence is not tracked.
    pub fn set_online(&mut self, online: bool) {
        if let Some(current) = self.online.as_mut() {
            *current = online;
            self.revision += 1;
        }
    }

    /// Apply one inbound frame
    ///
    /// Returns the frame to send back, if any: chat messages from the other
    /// side are acknowledged with a read marker straight away.
    pub fn apply(&mut self, frame: InboundFrame, now: Instant) -> Option<OutboundFrame> {
        let from_self = frame.origin() == &self.self_id;
        self.revision += 1;
        if !from_self {
            if let Some(online) = self.online.as_mut() {
                *online = true;
            }
        }

        match frame {
            InboundFrame::Typing { is_typing, .. } => {
                if !from_self {
                    self.remote_typing = is_typing;
                    self.typing_deadline = is_typing.then(|| now + self.typing_expiry);
                }
                None
            }
            InboundFrame::Read { .. } => {
                if !from_self {
                    self.all_read = true;
                }
                None
            }
            InboundFrame::Chat(message) => {
                self.messages.push(message);
                self.remote_typing = false;
                self.typing_deadline = None;
                (!from_self).then_some(OutboundFrame::Read)
            }
        }
    }

    /// Clear a remote typing indicator whose renewal never came
    ///
    /// Returns true if the indicator was cleared.
    pub fn expire_typing(&mut self, now: Instant) -> bool {
        match self.typing_deadline {
            Some(deadline) if now >= deadline => {
                self.typing_deadline = None;
                self.remote_typing = false;
                self.revision += 1;
                true
            }
            _ => false,
        }
    }

    /// When the remote typing indicator expires, if it is showing
    pub fn typing_deadline(&self) -> Option<Instant> {
        self.typing_deadline
    }

    /// A local message went out; earlier read markers no longer cover it
    pub fn record_send(&mut self) {
        self.all_read = false;
        self.revision += 1;
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn all_read(&self) -> bool {
        self.all_read
    }

    pub fn remote_typing(&self) -> bool {
        self.remote_typing
    }

    pub fn online(&self) -> Option<bool> {
        self.online
    }

    /// Changes whenever the state may have changed
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            messages: self.messages.clone(),
            all_read: self.all_read,
            remote_typing: self.remote_typing,
            online: self.online,
        }
    }
}
