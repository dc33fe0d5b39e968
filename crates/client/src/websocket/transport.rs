//! Transport abstraction for the realtime connection
//!
//! A transport is reduced to two text channels. The inbound channel ending is
//! the only close signal: a server close frame, a socket error and an auth
//! rejection all look the same from above.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use url::Url;

use support_chat_shared::SessionId;

use crate::error::{ClientError, ClientResult};

/// Both directions of an established transport
#[derive(Debug)]
pub struct TransportLink {
    /// Text frames to write; dropping the sender closes the transport
    pub outbound: mpsc::UnboundedSender<String>,
    /// Text frames read; yields `None` once the transport is closed
    pub inbound: mpsc::UnboundedReceiver<String>,
}

/// Opens transports to a realtime endpoint
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &Url) -> ClientResult<TransportLink>;
}

/// Build the realtime endpoint for a session
///
/// `http` maps to `ws` and `https` to `wss`; the token travels as a query parameter.
pub fn realtime_endpoint(api_url: &Url, session_id: &SessionId, token: &str) -> ClientResult<Url> {
    let mut url = api_url.clone();
    let scheme = match api_url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(ClientError::UnsupportedScheme(other.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|_| ClientError::UnsupportedScheme(api_url.scheme().to_string()))?;

    let base_path = url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{base_path}/api/ws/chat/{}", session_id.as_str()));
    url.set_query(None);
    url.query_pairs_mut().append_pair("token", token);
    Ok(url)
}

/// WebSocket transport backed by tokio-tungstenite
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &Url) -> ClientResult<TransportLink> {
        let (socket, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let (mut sink, mut stream) = socket.split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();

        // Writer: runs until the owner drops its sender or the socket rejects a write
        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if sink.send(WsMessage::Text(text)).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Reader: runs until the socket closes or the owner stops listening
        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(WsMessage::Text(text)) => {
                        if inbound_tx.send(text).is_err() {
                            break;
                        }
                    }
                    Ok(WsMessage::Close(frame)) => {
                        tracing::debug!(close_frame = ?frame, "WebSocket close frame received");
                        break;
                    }
                    Ok(_) => {} // Ping/pong handled by tungstenite, binary ignored
                    Err(e) => {
                        tracing::debug!(error = %e, "WebSocket read failed");
                        break;
                    }
                }
            }
        });

        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_realtime_endpoint_https() {
        let api = Url::parse("https://shop.example.com").unwrap();
        let url = realtime_endpoint(&api, &SessionId::from("chat_u1"), "abc.def").unwrap();
        assert_eq!(
            url.as_str(),
            "wss://shop.example.com/api/ws/chat/chat_u1?token=abc.def"
        );
    }

    #[test]
    fn test_realtime_endpoint_http_with_base_path() {
        let api = Url::parse("http://localhost:8001/backend/").unwrap();
        let url = realtime_endpoint(&api, &SessionId::from("chat_u1"), "t k").unwrap();
        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.path(), "/backend/api/ws/chat/chat_u1");
        assert_eq!(
            url.query_pairs().find(|(k, _)| k == "token").map(|(_, v)| v.into_owned()),
            Some("t k".to_string())
        );
    }

    #[test]
    fn test_realtime_endpoint_rejects_other_schemes() {
        let api = Url::parse("ftp://example.com").unwrap();
        assert!(matches!(
            realtime_endpoint(&api, &SessionId::from("chat_u1"), "t"),
            Err(ClientError::UnsupportedScheme(_))
        ));
    }
}
