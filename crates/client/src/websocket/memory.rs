//! In-process transport
//!
//! Every successful `connect` hands the server side of the link to whoever
//! holds the acceptor. Dropping `to_client` closes the transport from the
//! server side; `from_client` yields `None` once the client closes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

use super::transport::{Connector, TransportLink};
use crate::error::{ClientError, ClientResult};

/// Server side of one in-process connection
#[derive(Debug)]
pub struct MemoryPeer {
    /// Endpoint the client asked for, including the token query parameter
    pub url: Url,
    /// Frames delivered to the client
    pub to_client: mpsc::UnboundedSender<String>,
    /// Frames written by the client
    pub from_client: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// Value of the `token` query parameter
    pub fn token(&self) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(key, _)| key == "token")
            .map(|(_, value)| value.into_owned())
    }

    /// Last path segment, i.e. the session id
    pub fn session(&self) -> Option<String> {
        self.url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(str::to_string)
    }
}

/// Connector that keeps both ends of every link in process
#[derive(Debug)]
pub struct MemoryConnector {
    acceptor: mpsc::UnboundedSender<MemoryPeer>,
    refusing: AtomicBool,
}

impl MemoryConnector {
    /// Create a connector and the receiver of its accepted peers
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (acceptor, accepted) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            acceptor,
            refusing: AtomicBool::new(false),
        });
        (connector, accepted)
    }

    /// Make subsequent connects fail, as an unreachable server would
    pub fn set_refusing(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &Url) -> ClientResult<TransportLink> {
        if self.refusing.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("connection refused".to_string()));
        }

        let (outbound, from_client) = mpsc::unbounded_channel();
        let (to_client, inbound) = mpsc::unbounded_channel();
        let peer = MemoryPeer {
            url: url.clone(),
            to_client,
            from_client,
        };
        self.acceptor
            .send(peer)
            .map_err(|_| ClientError::Transport("no acceptor".to_string()))?;

        Ok(TransportLink { outbound, inbound })
    }
}
