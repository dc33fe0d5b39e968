//! REST collaborator for chat history and the admin session directory

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use url::Url;

use support_chat_shared::{Message, SessionId, SessionSummary};

use crate::error::{ClientError, ClientResult};

/// Maximum number of retry attempts for transient history failures
const MAX_RETRIES: usize = 3;

/// Initial backoff duration for retries (100ms)
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Maximum backoff duration for retries (5 seconds)
const RETRY_MAX_DELAY: Duration = Duration::from_secs(5);

/// Read-only chat endpoints
#[async_trait]
pub trait ChatApi: Send + Sync + 'static {
    /// Ordered message history of one session
    async fn history(&self, session_id: &SessionId) -> ClientResult<Vec<Message>>;

    /// All customer sessions (admin only)
    async fn session_directory(&self) -> ClientResult<Vec<SessionSummary>>;
}

/// HTTP implementation of `ChatApi`
pub struct RestClient {
    http_client: Client,
    api_url: Url,
    auth_token: Option<String>,
}

impl RestClient {
    pub fn new(api_url: Url, auth_token: Option<String>, timeout: Duration) -> ClientResult<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            api_url,
            auth_token,
        })
    }

    fn endpoint(&self, path: &str) -> Url {
        let base = self.api_url.path().trim_end_matches('/').to_string();
        let mut url = self.api_url.clone();
        url.set_path(&format!("{base}{path}"));
        url.set_query(None);
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> ClientResult<T> {
        let token = self.auth_token.as_deref().ok_or(ClientError::Unauthenticated)?;
        let response = self.http_client.get(url).bearer_auth(token).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl ChatApi for RestClient {
    /// Retries transient failures with exponential backoff and jitter
    async fn history(&self, session_id: &SessionId) -> ClientResult<Vec<Message>> {
        use tokio_retry::strategy::{jitter, ExponentialBackoff};
        use tokio_retry::Retry;

        let url = self.endpoint(&format!("/api/chat/messages/{}", session_id.as_str()));

        let retry_strategy = ExponentialBackoff::from_millis(RETRY_BASE_DELAY.as_millis() as u64)
            .max_delay(RETRY_MAX_DELAY)
            .take(MAX_RETRIES)
            .map(jitter);

        Retry::spawn(retry_strategy, || async {
            let result = self.get_json::<Vec<Message>>(url.clone()).await;

            match &result {
                Ok(_) => Ok(result),
                Err(e) if e.is_transient() => {
                    tracing::debug!(
                        session_id = %session_id,
                        error = %e,
                        "Transient history error - will retry"
                    );
                    Err(result)
                }
                Err(_) => Ok(result),
            }
        })
        .await
        .unwrap_or_else(|e| e)
    }

    async fn session_directory(&self) -> ClientResult<Vec<SessionSummary>> {
        let url = self.endpoint("/api/admin/chats");
        self.get_json(url).await
    }
}
