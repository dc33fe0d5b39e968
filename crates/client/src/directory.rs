//! Admin session directory
//!
//! Polls the list of customer sessions and lets an operator focus one of them
//! in a foreground view. Polling keeps running while a session is focused, and
//! every poll refreshes the focused view's counterpart presence.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use support_chat_shared::{SessionId, SessionSummary};

use crate::context::ChatContext;
use crate::rest::ChatApi;
use crate::session::{ChatView, PresenceFeed};

pub struct SessionDirectory {
    context: ChatContext,
    sessions: watch::Receiver<Vec<SessionSummary>>,
    poller: Option<JoinHandle<()>>,
    focused: Option<ChatView>,
    presence: Option<JoinHandle<()>>,
}

impl SessionDirectory {
    /// Start polling; the first poll happens immediately
    pub fn start(context: ChatContext) -> Self {
        let (sessions_tx, sessions) = watch::channel(Vec::new());
        let poller = tokio::spawn(poll_sessions(
            Arc::clone(&context.api),
            context.timings.directory_poll,
            sessions_tx,
        ));

        Self {
            context,
            sessions,
            poller: Some(poller),
            focused: None,
            presence: None,
        }
    }

    /// Latest known sessions
    pub fn sessions(&self) -> Vec<SessionSummary> {
        self.sessions.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<SessionSummary>> {
        self.sessions.clone()
    }

    pub fn focused(&self) -> Option<&ChatView> {
        self.focused.as_ref()
    }

    /// Open a view on one session, closing any previously focused one
    ///
    /// Counterpart presence starts from the directory entry and follows
    /// every later poll.
    pub async fn focus(&mut self, session_id: &SessionId) -> &ChatView {
        self.leave();

        // Not marked seen, so a poll landing while history loads still reaches the view
        let sessions = self.sessions.clone();
        let online = listed_online(&sessions.borrow(), session_id).unwrap_or(false);

        let view = ChatView::open(&self.context, session_id.clone(), Some(online)).await;
        self.presence = Some(tokio::spawn(follow_presence(
            sessions,
            session_id.clone(),
            view.presence_feed(),
        )));
        &*self.focused.insert(view)
    }

    /// Close the focused view, if any
    pub fn leave(&mut self) {
        if let Some(presence) = self.presence.take() {
            presence.abort();
        }
        if let Some(mut view) = self.focused.take() {
            view.close();
        }
    }

    /// Stop polling and close the focused view
    pub fn stop(&mut self) {
        self.leave();
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }
}

impl Drop for SessionDirectory {
    fn drop(&mut self) {
        self.stop();
    }
}

fn listed_online(sessions: &[SessionSummary], session_id: &SessionId) -> Option<bool> {
    sessions
        .iter()
        .find(|summary| &summary.session_id == session_id)
        .map(|summary| summary.online)
}

/// Push the polled presence of one session into its view
async fn follow_presence(
    mut sessions: watch::Receiver<Vec<SessionSummary>>,
    session_id: SessionId,
    feed: PresenceFeed,
) {
    while sessions.changed().await.is_ok() {
        let Some(online) = listed_online(&sessions.borrow_and_update(), &session_id) else {
            continue;
        };
        if !feed.set_online(online) {
            break;
        }
    }
}

async fn poll_sessions(
    api: Arc<dyn ChatApi>,
    period: Duration,
    sessions: watch::Sender<Vec<SessionSummary>>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match api.session_directory().await {
            Ok(latest) => {
                tracing::debug!(count = latest.len(), "Session directory refreshed");
                sessions.send_replace(latest);
            }
            // Keep showing the previous list
            Err(e) => tracing::warn!(error = %e, "Failed to poll chat sessions"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::ChatTimings;
    use crate::error::{ClientError, ClientResult};
    use crate::websocket::{MemoryConnector, MemoryPeer};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use support_chat_shared::{Message, UserId};
    use tokio::sync::mpsc;
    use url::Url;

    #[derive(Default)]
    struct FakeDirectory {
        polls: AtomicUsize,
        failing: AtomicBool,
        online: AtomicBool,
    }

    #[async_trait]
    impl ChatApi for FakeDirectory {
        async fn history(&self, _session_id: &SessionId) -> ClientResult<Vec<Message>> {
            Ok(Vec::new())
        }

        async fn session_directory(&self) -> ClientResult<Vec<SessionSummary>> {
            let poll = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.failing.load(Ordering::SeqCst) {
                return Err(ClientError::Status(503));
            }
            Ok(vec![SessionSummary {
                session_id: SessionId::from("chat_u1"),
                user_id: Some(UserId::from("u1")),
                counterpart_name: "Jo".to_string(),
                last_message: format!("poll {poll}"),
                last_message_at: None,
                online: self.online.load(Ordering::SeqCst),
            }])
        }
    }

    fn directory() -> (
        SessionDirectory,
        Arc<FakeDirectory>,
        mpsc::UnboundedReceiver<MemoryPeer>,
    ) {
        let (connector, accepted) = MemoryConnector::new();
        let api = Arc::new(FakeDirectory::default());
        let context = ChatContext {
            connector,
            api: api.clone(),
            api_url: Url::parse("http://test").unwrap(),
            timings: ChatTimings::default(),
            auth_token: Some("admin".to_string()),
            self_id: UserId::from("admin"),
        };
        (SessionDirectory::start(context), api, accepted)
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_immediately_then_on_interval() {
        let (directory, api, _accepted) = directory();
        let mut sessions = directory.subscribe();

        sessions.wait_for(|list| !list.is_empty()).await.unwrap();
        assert_eq!(api.polls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(9_999)).await;
        assert_eq!(api.polls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(api.polls.load(Ordering::SeqCst), 2);
        assert_eq!(directory.sessions()[0].last_message, "poll 2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_poll_keeps_previous_list() {
        let (directory, api, _accepted) = directory();
        let mut sessions = directory.subscribe();
        sessions.wait_for(|list| !list.is_empty()).await.unwrap();

        api.failing.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10_001)).await;

        assert_eq!(api.polls.load(Ordering::SeqCst), 2);
        assert_eq!(directory.sessions().len(), 1);
        assert_eq!(directory.sessions()[0].last_message, "poll 1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_focus_opens_view_and_polling_continues() {
        let (mut directory, api, mut accepted) = directory();
        let mut sessions = directory.subscribe();
        sessions.wait_for(|list| !list.is_empty()).await.unwrap();

        let view = directory.focus(&SessionId::from("chat_u1")).await;
        assert_eq!(view.snapshot().online, Some(false));
        let mut updates = view.subscribe();

        let peer = accepted.recv().await.unwrap();
        assert_eq!(peer.session().as_deref(), Some("chat_u1"));
        assert_eq!(peer.token().as_deref(), Some("admin"));

        peer.to_client
            .send(r#"{"type":"typing","senderId":"u1","isTyping":true}"#.to_string())
            .unwrap();
        updates
            .wait_for(|s| s.online == Some(true))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(10_001)).await;
        assert_eq!(api.polls.load(Ordering::SeqCst), 2);
        assert!(directory.focused().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_focused_presence_follows_poll() {
        let (mut directory, api, mut accepted) = directory();
        api.online.store(true, Ordering::SeqCst);
        let mut sessions = directory.subscribe();
        sessions.wait_for(|list| !list.is_empty()).await.unwrap();

        let view = directory.focus(&SessionId::from("chat_u1")).await;
        assert_eq!(view.snapshot().online, Some(true));
        let mut updates = view.subscribe();
        let _peer = accepted.recv().await.unwrap();

        api.online.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10_001)).await;

        let snapshot = updates
            .wait_for(|s| s.online == Some(false))
            .await
            .unwrap()
            .clone();
        assert_eq!(snapshot.online, Some(false));
        assert!(!directory.sessions()[0].online);
    }

    #[tokio::test]
    async fn test_switching_focus_closes_previous_view() {
        let (mut directory, _api, mut accepted) = directory();

        directory.focus(&SessionId::from("chat_u1")).await;
        let mut first = accepted.recv().await.unwrap();
        assert_eq!(
            first.from_client.recv().await.as_deref(),
            Some(r#"{"type":"read"}"#)
        );

        directory.focus(&SessionId::from("chat_u2")).await;
        assert_eq!(first.from_client.recv().await, None);

        let second = accepted.recv().await.unwrap();
        assert_eq!(second.session().as_deref(), Some("chat_u2"));
        assert_eq!(
            directory.focused().map(|view| view.session_id().as_str()),
            Some("chat_u2")
        );

        directory.leave();
        assert!(directory.focused().is_none());
    }
}
