//! Managed realtime connection
//!
//! A `ConnectionManager` owns at most one live transport for one chat session,
//! reconnects it after unrequested closes with a fixed delay, and translates raw
//! text frames into `ConnectionEvent`s for the owning view.
//!
//! Every `open` starts a new generation. Closing bumps the generation under the
//! same lock that guards the outbound sender, so a driver task that is still
//! unwinding after abort can no longer change state, write frames or emit events.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use url::Url;
use uuid::Uuid;

use support_chat_shared::SessionId;

use super::events::{InboundFrame, OutboundFrame};
use super::state::ConnectionState;
use super::transport::{realtime_endpoint, Connector, TransportLink};
use crate::config::ChatTimings;

/// Events delivered to the owner of a connection
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Transport is open; the read marker (if enabled) has already been written
    Opened,
    /// A decoded inbound frame
    Frame(InboundFrame),
    /// Transport closed without being asked to; a reconnect is scheduled
    Closed,
}

/// How a connection behaves
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// REST base URL the realtime endpoint is derived from
    pub api_url: Url,
    /// Fixed delay before every reconnect attempt
    pub reconnect_delay: Duration,
    /// Write a read marker as soon as the transport opens
    pub read_on_open: bool,
    /// Label used in logs
    pub role: &'static str,
}

impl ConnectionOptions {
    /// Options for a connection owned by a visible chat view
    pub fn foreground(api_url: Url, timings: &ChatTimings) -> Self {
        Self {
            api_url,
            reconnect_delay: timings.foreground_reconnect,
            read_on_open: true,
            role: "foreground",
        }
    }

    /// Options for the passive unread listener
    pub fn background(api_url: Url, timings: &ChatTimings) -> Self {
        Self {
            api_url,
            reconnect_delay: timings.background_reconnect,
            read_on_open: false,
            role: "background",
        }
    }
}

struct Inner {
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<String>>,
}

struct Shared {
    state: watch::Sender<ConnectionState>,
    inner: Mutex<Inner>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Invalidate any running driver and return the new generation
    fn begin(&self) -> u64 {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.outbound = None;
        inner.generation
    }

    fn retire(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.outbound = None;
        self.state.send_replace(ConnectionState::Closed);
    }

    fn transition(&self, generation: u64, state: ConnectionState) -> bool {
        let inner = self.lock();
        if inner.generation != generation {
            return false;
        }
        self.state.send_replace(state);
        true
    }

    fn attach(&self, generation: u64, outbound: mpsc::UnboundedSender<String>) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation {
            return false;
        }
        inner.outbound = Some(outbound);
        self.state.send_replace(ConnectionState::Open);
        true
    }

    fn detach(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation == generation {
            inner.outbound = None;
        }
    }

    fn emit(&self, generation: u64, event: ConnectionEvent) -> bool {
        let inner = self.lock();
        if inner.generation != generation {
            return false;
        }
        // Owner may have stopped listening; that is not a transport failure
        let _ = self.events.send(event);
        true
    }

    fn write(&self, frame: &OutboundFrame) -> bool {
        let inner = self.lock();
        let outbound = match (&inner.outbound, *self.state.borrow()) {
            (Some(outbound), ConnectionState::Open) => outbound,
            (_, state) => {
                tracing::debug!(frame = ?frame, state = %state, "Dropping frame: connection not open");
                return false;
            }
        };
        match frame.to_json() {
            Ok(json) => outbound.send(json).is_ok(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize outbound frame");
                false
            }
        }
    }
}

/// Cloneable sending half of a managed connection
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Arc<Shared>,
}

impl ConnectionHandle {
    /// Write a frame if the connection is open
    ///
    /// Fire-and-forget: returns false when the frame was dropped, nothing is queued.
    pub fn send(&self, frame: &OutboundFrame) -> bool {
        self.shared.write(frame)
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Follow state transitions
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }
}

/// Owns one persistent connection to a session's realtime endpoint
///
/// Dropping the manager closes the connection and cancels any pending reconnect.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    options: ConnectionOptions,
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    /// Create an idle manager and the receiver of its events
    pub fn new(
        connector: Arc<dyn Connector>,
        options: ConnectionOptions,
    ) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::Idle);
        let shared = Arc::new(Shared {
            state,
            inner: Mutex::new(Inner {
                generation: 0,
                outbound: None,
            }),
            events: events_tx,
        });

        let manager = Self {
            connector,
            options,
            shared,
            task: None,
        };
        (manager, events_rx)
    }

    pub fn handle(&self) -> ConnectionHandle {
        ConnectionHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Connect to the session's realtime endpoint
    ///
    /// No-op when either the session or the token is missing. Replaces any
    /// connection this manager already holds.
    pub fn open(&mut self, session_id: Option<&SessionId>, auth_token: Option<&str>) {
        let (Some(session_id), Some(token)) = (session_id, auth_token.filter(|t| !t.is_empty()))
        else {
            tracing::debug!(role = self.options.role, "Skipping open: missing session or token");
            return;
        };

        let url = match realtime_endpoint(&self.options.api_url, session_id, token) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(role = self.options.role, session_id = %session_id, error = %e, "Skipping open: bad endpoint");
                return;
            }
        };

        if let Some(task) = self.task.take() {
            task.abort();
        }
        let generation = self.shared.begin();

        let driver = Driver {
            connector: Arc::clone(&self.connector),
            options: self.options.clone(),
            shared: Arc::clone(&self.shared),
            session_id: session_id.clone(),
            url,
            generation,
        };
        self.task = Some(tokio::spawn(driver.run()));
    }

    /// Write a frame if the connection is open, otherwise drop it
    pub fn send(&self, frame: &OutboundFrame) -> bool {
        self.shared.write(frame)
    }

    /// Close the transport and suppress reconnection
    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!(role = self.options.role, "Chat connection closed by owner");
        }
        self.shared.retire();
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}

/// The reconnect loop of one generation
struct Driver {
    connector: Arc<dyn Connector>,
    options: ConnectionOptions,
    shared: Arc<Shared>,
    session_id: SessionId,
    url: Url,
    generation: u64,
}

impl Driver {
    async fn run(self) {
        let Driver {
            connector,
            options,
            shared,
            session_id,
            url,
            generation,
        } = self;

        loop {
            if !shared.transition(generation, ConnectionState::Connecting) {
                return;
            }

            let connection_id = Uuid::new_v4();
            match connector.connect(&url).await {
                Ok(TransportLink {
                    outbound,
                    mut inbound,
                }) => {
                    if !shared.attach(generation, outbound) {
                        return;
                    }
                    tracing::info!(
                        role = options.role,
                        session_id = %session_id,
                        connection_id = %connection_id,
                        "Chat connection open"
                    );

                    if options.read_on_open {
                        shared.write(&OutboundFrame::Read);
                    }
                    shared.emit(generation, ConnectionEvent::Opened);

                    while let Some(text) = inbound.recv().await {
                        match InboundFrame::parse(&text) {
                            Some(frame) => {
                                if !shared.emit(generation, ConnectionEvent::Frame(frame)) {
                                    return;
                                }
                            }
                            None => {
                                tracing::debug!(
                                    connection_id = %connection_id,
                                    frame = %text,
                                    "Discarding unrecognized frame"
                                );
                            }
                        }
                    }

                    shared.detach(generation);
                    tracing::info!(
                        role = options.role,
                        session_id = %session_id,
                        connection_id = %connection_id,
                        "Chat connection closed by transport"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        role = options.role,
                        session_id = %session_id,
                        connection_id = %connection_id,
                        error = %e,
                        "Chat connection failed"
                    );
                }
            }

            if !shared.transition(generation, ConnectionState::Closed) {
                return;
            }
            shared.emit(generation, ConnectionEvent::Closed);

            // Auth rejections land here too and are retried like any other close
            if !shared.transition(generation, ConnectionState::Reconnecting) {
                return;
            }
            tracing::debug!(
                role = options.role,
                session_id = %session_id,
                delay_ms = options.reconnect_delay.as_millis() as u64,
                "Scheduling reconnect"
            );
            tokio::time::sleep(options.reconnect_delay).await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::websocket::memory::{MemoryConnector, MemoryPeer};
    use tokio::time::{timeout, Instant};

    fn manager(
        read_on_open: bool,
    ) -> (
        ConnectionManager,
        mpsc::UnboundedReceiver<ConnectionEvent>,
        mpsc::UnboundedReceiver<MemoryPeer>,
    ) {
        let (connector, accepted) = MemoryConnector::new();
        let timings = ChatTimings::default();
        let api = Url::parse("http://test").unwrap();
        let options = if read_on_open {
            ConnectionOptions::foreground(api, &timings)
        } else {
            ConnectionOptions::background(api, &timings)
        };
        let (manager, events) = ConnectionManager::new(connector, options);
        (manager, events, accepted)
    }

    fn session() -> SessionId {
        SessionId::from("chat_u1")
    }

    #[tokio::test]
    async fn test_open_without_credentials_is_noop() {
        let (mut manager, _events, mut accepted) = manager(true);

        manager.open(None, Some("tok"));
        manager.open(Some(&session()), None);
        manager.open(Some(&session()), Some(""));

        assert_eq!(manager.state(), ConnectionState::Idle);
        assert!(accepted.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_open_sends_read_marker_first() {
        let (mut manager, mut events, mut accepted) = manager(true);
        manager.open(Some(&session()), Some("u1"));

        let mut peer = accepted.recv().await.unwrap();
        assert_eq!(peer.token().as_deref(), Some("u1"));
        assert_eq!(peer.session().as_deref(), Some("chat_u1"));
        assert_eq!(events.recv().await, Some(ConnectionEvent::Opened));
        assert_eq!(manager.state(), ConnectionState::Open);
        assert_eq!(peer.from_client.recv().await.as_deref(), Some(r#"{"type":"read"}"#));
    }

    #[tokio::test]
    async fn test_background_open_is_silent() {
        let (mut manager, mut events, mut accepted) = manager(false);
        manager.open(Some(&session()), Some("u1"));

        let mut peer = accepted.recv().await.unwrap();
        assert_eq!(events.recv().await, Some(ConnectionEvent::Opened));
        assert!(manager.send(&OutboundFrame::Typing { is_typing: false }));
        assert_eq!(
            peer.from_client.recv().await.as_deref(),
            Some(r#"{"type":"typing","isTyping":false}"#)
        );
    }

    #[tokio::test]
    async fn test_send_before_open_is_dropped() {
        let (manager, _events, _accepted) = manager(true);
        assert!(!manager.send(&OutboundFrame::Message {
            message: "lost".to_string()
        }));
    }

    #[tokio::test]
    async fn test_frames_are_decoded_and_garbage_skipped() {
        let (mut manager, mut events, mut accepted) = manager(true);
        manager.open(Some(&session()), Some("u1"));
        let peer = accepted.recv().await.unwrap();
        assert_eq!(events.recv().await, Some(ConnectionEvent::Opened));

        peer.to_client.send("{{nope".to_string()).unwrap();
        peer.to_client
            .send(r#"{"type":"read","readBy":"admin"}"#.to_string())
            .unwrap();

        match events.recv().await {
            Some(ConnectionEvent::Frame(InboundFrame::Read { read_by })) => {
                assert_eq!(read_by.as_str(), "admin");
            }
            other => panic!("Expected read frame, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_fixed_delay() {
        let (mut manager, mut events, mut accepted) = manager(true);
        manager.open(Some(&session()), Some("u1"));
        let peer = accepted.recv().await.unwrap();
        assert_eq!(events.recv().await, Some(ConnectionEvent::Opened));

        let closed_at = Instant::now();
        drop(peer);
        assert_eq!(events.recv().await, Some(ConnectionEvent::Closed));
        assert_eq!(manager.state(), ConnectionState::Reconnecting);

        // Nothing before the backoff elapses
        assert!(timeout(Duration::from_millis(2999), accepted.recv())
            .await
            .is_err());

        let mut states = manager.handle().watch_state();
        let _second = accepted.recv().await.unwrap();
        assert!(closed_at.elapsed() >= Duration::from_millis(3000));
        states
            .wait_for(|state| *state == ConnectionState::Open)
            .await
            .unwrap();
        assert_eq!(events.recv().await, Some(ConnectionEvent::Opened));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_forever_while_refused() {
        let (connector, mut accepted) = MemoryConnector::new();
        connector.set_refusing(true);
        let options = ConnectionOptions::foreground(
            Url::parse("http://test").unwrap(),
            &ChatTimings::default(),
        );
        let (mut manager, mut events) = ConnectionManager::new(connector.clone(), options);
        manager.open(Some(&session()), Some("u1"));

        for _ in 0..5 {
            assert_eq!(events.recv().await, Some(ConnectionEvent::Closed));
        }

        connector.set_refusing(false);
        assert!(accepted.recv().await.is_some());
        assert_eq!(events.recv().await, Some(ConnectionEvent::Opened));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_pending_reconnect() {
        let (mut manager, mut events, mut accepted) = manager(true);
        manager.open(Some(&session()), Some("u1"));
        let peer = accepted.recv().await.unwrap();
        assert_eq!(events.recv().await, Some(ConnectionEvent::Opened));

        drop(peer);
        assert_eq!(events.recv().await, Some(ConnectionEvent::Closed));
        manager.close();
        assert_eq!(manager.state(), ConnectionState::Closed);

        assert!(timeout(Duration::from_secs(60), accepted.recv())
            .await
            .is_err());
        assert_eq!(manager.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_drop_closes_transport() {
        let (mut manager, mut events, mut accepted) = manager(true);
        manager.open(Some(&session()), Some("u1"));
        let mut peer = accepted.recv().await.unwrap();
        assert_eq!(events.recv().await, Some(ConnectionEvent::Opened));
        assert_eq!(peer.from_client.recv().await.as_deref(), Some(r#"{"type":"read"}"#));

        drop(manager);
        assert_eq!(peer.from_client.recv().await, None);
    }
}
