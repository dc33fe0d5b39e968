//! Everything a chat component needs to reach the backend

use std::sync::Arc;

use url::Url;

use support_chat_shared::UserId;

use crate::config::{ChatTimings, Config};
use crate::error::{ClientError, ClientResult};
use crate::rest::{ChatApi, RestClient};
use crate::websocket::{Connector, WsConnector};

/// Shared dependencies of views, listeners and the directory
#[derive(Clone)]
pub struct ChatContext {
    pub connector: Arc<dyn Connector>,
    pub api: Arc<dyn ChatApi>,
    pub api_url: Url,
    pub timings: ChatTimings,
    pub auth_token: Option<String>,
    /// Participant id of whoever runs this client
    pub self_id: UserId,
}

impl ChatContext {
    /// Context talking to the configured backend over WebSocket and HTTP
    pub fn from_config(config: &Config) -> ClientResult<Self> {
        let self_id = config.user_id.clone().ok_or(ClientError::Unauthenticated)?;
        let api = RestClient::new(
            config.api_url.clone(),
            config.auth_token.clone(),
            config.request_timeout(),
        )?;

        Ok(Self {
            connector: Arc::new(WsConnector),
            api: Arc::new(api),
            api_url: config.api_url.clone(),
            timings: config.timings(),
            auth_token: config.auth_token.clone(),
            self_id,
        })
    }
}
