use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::warn;

use tutor_types::api::{
    ConversationListResponse, ConversationSummary, ErrorResponse, HistoryQuery, HistoryResponse,
    MarkReadRequest, MarkReadResponse, MessageView, SendMessageRequest, SendMessageResponse,
    UnreadCountResponse,
};

use crate::error::ClientError;
use crate::outbox::Outbox;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// REST client for the chat endpoints, authenticated with a bearer token.
#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// WebSocket URL of the gateway on the same server.
    pub fn gateway_url(&self) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.base_url.clone()
        };
        format!("{}/gateway", ws_base)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
    }

    pub async fn send_message(&self, req: &SendMessageRequest) -> Result<SendMessageResponse, ClientError> {
        let response = self.request(Method::POST, "/api/chat/messages").json(req).send().await?;
        decode(response).await
    }

    /// Send through an `Outbox`: the entry is `Pending` while the request
    /// runs, then `Confirmed` or `Failed` with the draft kept for retry.
    pub async fn send_tracked(
        &self,
        outbox: &mut Outbox,
        req: SendMessageRequest,
    ) -> Result<MessageView, ClientError> {
        let temp_id = outbox.begin(req.content.clone());
        match self.send_message(&req).await {
            Ok(response) => {
                outbox.confirm(temp_id, response.message.clone());
                Ok(response.message)
            }
            Err(e) => {
                warn!("Send failed, keeping draft for retry: {}", e);
                outbox.fail(temp_id);
                Err(e)
            }
        }
    }

    pub async fn history(&self, query: &HistoryQuery) -> Result<Vec<MessageView>, ClientError> {
        let response = self.request(Method::GET, "/api/chat/messages").query(query).send().await?;
        let body: HistoryResponse = decode(response).await?;
        Ok(body.messages)
    }

    /// Returns how many messages actually flipped to read.
    pub async fn mark_read(&self, message_ids: &[i64]) -> Result<usize, ClientError> {
        let body = MarkReadRequest {
            message_ids: message_ids.to_vec(),
        };
        let response = self
            .request(Method::PATCH, "/api/chat/messages/read")
            .json(&body)
            .send()
            .await?;
        let body: MarkReadResponse = decode(response).await?;
        Ok(body.updated_count)
    }

    pub async fn unread_count(&self) -> Result<i64, ClientError> {
        let response = self.request(Method::GET, "/api/chat/unread-count").send().await?;
        let body: UnreadCountResponse = decode(response).await?;
        Ok(body.unread_count)
    }

    pub async fn conversations(&self) -> Result<Vec<ConversationSummary>, ClientError> {
        let response = self.request(Method::GET, "/api/chat/conversations").send().await?;
        let body: ConversationListResponse = decode(response).await?;
        Ok(body.conversations)
    }
}

/// Decode a success body, or turn `{success:false, error}` into `ClientError::Api`.
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    let bytes = response.bytes().await?;

    if !status.is_success() {
        let message = serde_json::from_slice::<ErrorResponse>(&bytes)
            .map(|e| e.error)
            .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).chars().take(200).collect());
        return Err(ClientError::Api {
            status: status.as_u16(),
            message,
        });
    }

    Ok(serde_json::from_slice(&bytes)?)
}
