//! Customer chat entry point
//!
//! The widget listens in the background while closed and hands the session
//! over to a foreground view when opened. The two never hold a connection at
//! the same time.

use support_chat_shared::SessionId;

use crate::context::ChatContext;
use crate::presence::{PresenceListener, UnreadCounter};
use crate::session::ChatView;

pub struct ChatWidget {
    context: ChatContext,
    session_id: SessionId,
    unread: UnreadCounter,
    background: Option<PresenceListener>,
    foreground: Option<ChatView>,
}

impl ChatWidget {
    /// Widget for the customer's own session, `chat_<userId>`
    pub fn new(context: ChatContext) -> Self {
        let session_id = SessionId::for_customer(&context.self_id);
        Self {
            context,
            session_id,
            unread: UnreadCounter::new(),
            background: None,
            foreground: None,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn unread(&self) -> &UnreadCounter {
        &self.unread
    }

    pub fn is_listening(&self) -> bool {
        self.background.is_some()
    }

    pub fn view(&self) -> Option<&ChatView> {
        self.foreground.as_ref()
    }

    /// Begin background listening unless a view is open
    pub fn start(&mut self) {
        if self.foreground.is_some() || self.background.is_some() {
            return;
        }
        self.background = Some(PresenceListener::start(
            &self.context,
            self.session_id.clone(),
            self.unread.clone(),
        ));
    }

    /// Open the conversation
    ///
    /// The background connection is torn down and the badge cleared before the
    /// view connects.
    pub async fn open_view(&mut self) -> &ChatView {
        if let Some(listener) = self.background.take() {
            listener.stop().await;
        }
        self.unread.reset();

        let view = match self.foreground.take() {
            Some(view) => view,
            None => ChatView::open(&self.context, self.session_id.clone(), None).await,
        };
        &*self.foreground.insert(view)
    }

    /// Close the conversation and resume background listening
    pub fn close_view(&mut self) {
        if let Some(mut view) = self.foreground.take() {
            view.close();
        }
        self.start();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::ChatTimings;
    use crate::error::ClientResult;
    use crate::rest::ChatApi;
    use crate::websocket::{MemoryConnector, MemoryPeer};
    use async_trait::async_trait;
    use std::sync::Arc;
    use support_chat_shared::{Message, SessionSummary, UserId};
    use tokio::sync::mpsc;
    use url::Url;

    struct NoApi;

    #[async_trait]
    impl ChatApi for NoApi {
        async fn history(&self, _session_id: &SessionId) -> ClientResult<Vec<Message>> {
            Ok(Vec::new())
        }

        async fn session_directory(&self) -> ClientResult<Vec<SessionSummary>> {
            Ok(Vec::new())
        }
    }

    fn widget() -> (ChatWidget, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (connector, accepted) = MemoryConnector::new();
        let context = ChatContext {
            connector,
            api: Arc::new(NoApi),
            api_url: Url::parse("http://test").unwrap(),
            timings: ChatTimings::default(),
            auth_token: Some("u1".to_string()),
            self_id: UserId::from("u1"),
        };
        (ChatWidget::new(context), accepted)
    }

    fn admin_message() -> String {
        r#"{"chatId":"chat_u1","senderId":"admin","senderName":"Support","isAdmin":true,"message":"ping","createdAt":"2024-05-01T12:00:00"}"#.to_string()
    }

    #[tokio::test]
    async fn test_customer_session_id() {
        let (widget, _accepted) = widget();
        assert_eq!(widget.session_id().as_str(), "chat_u1");
    }

    #[tokio::test]
    async fn test_open_view_hands_over_connection() {
        let (mut widget, mut accepted) = widget();
        widget.start();
        assert!(widget.is_listening());

        let mut background = accepted.recv().await.unwrap();
        assert_eq!(background.session().as_deref(), Some("chat_u1"));

        let mut badge = widget.unread().subscribe();
        background.to_client.send(admin_message()).unwrap();
        background.to_client.send(admin_message()).unwrap();
        badge.wait_for(|count| *count == 2).await.unwrap();

        widget.open_view().await;
        assert!(!widget.is_listening());
        assert_eq!(widget.unread().get(), 0);

        // Background link is gone before the foreground one exists
        assert_eq!(background.from_client.recv().await, None);
        let mut foreground = accepted.recv().await.unwrap();
        assert_eq!(
            foreground.from_client.recv().await.as_deref(),
            Some(r#"{"type":"read"}"#)
        );
    }

    #[tokio::test]
    async fn test_start_is_noop_while_view_open() {
        let (mut widget, mut accepted) = widget();
        widget.open_view().await;
        let _foreground = accepted.recv().await.unwrap();

        widget.start();
        assert!(!widget.is_listening());
        assert!(accepted.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_view_resumes_listening() {
        let (mut widget, mut accepted) = widget();
        widget.open_view().await;
        let mut foreground = accepted.recv().await.unwrap();
        assert_eq!(
            foreground.from_client.recv().await.as_deref(),
            Some(r#"{"type":"read"}"#)
        );

        widget.close_view();
        assert!(widget.view().is_none());
        assert!(widget.is_listening());
        assert_eq!(foreground.from_client.recv().await, None);

        let mut background = accepted.recv().await.unwrap();
        let mut badge = widget.unread().subscribe();
        background.to_client.send(admin_message()).unwrap();
        badge.wait_for(|count| *count == 1).await.unwrap();
        assert!(background.from_client.try_recv().is_err());
    }
}
