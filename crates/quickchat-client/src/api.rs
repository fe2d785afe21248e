//! Message store access over HTTP

use crate::error::{ClientError, Result};
use async_trait::async_trait;
use quickchat_common::models::{ConversationsResponse, HistoryResponse, SendMessageResponse};
use quickchat_common::{ConversationSummary, Message, SendMessageInput, UserId};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

/// Header carrying the caller's identity.
pub const CALLER_HEADER: &str = "x-user-id";

/// The message store as seen by one signed-in viewer.
#[async_trait]
pub trait MessageApi: Send + Sync {
    async fn conversations(&self) -> Result<Vec<ConversationSummary>>;

    /// Full history with `peer`. The store marks the peer's messages seen.
    async fn history(&self, peer: &str) -> Result<Vec<Message>>;

    async fn send(&self, peer: &str, input: &SendMessageInput) -> Result<Message>;

    async fn mark_seen(&self, message_id: &str) -> Result<()>;
}

#[derive(Clone, Debug)]
pub struct HttpMessageApi {
    client: reqwest::Client,
    base_url: Url,
    identity: UserId,
}

impl HttpMessageApi {
    pub fn new(server_url: &str, identity: impl Into<UserId>) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: Url::parse(server_url)?,
            identity: identity.into(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(["api", "messages"])
            .extend(segments);
        Ok(url)
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json().await?);
        }

        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
            .unwrap_or(body);
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl MessageApi for HttpMessageApi {
    async fn conversations(&self) -> Result<Vec<ConversationSummary>> {
        let url = self.endpoint(&["conversations"])?;
        debug!("GET {}", url);
        let resp = self
            .client
            .get(url)
            .header(CALLER_HEADER, &self.identity)
            .send()
            .await?;
        let body: ConversationsResponse = Self::decode(resp).await?;
        Ok(body.conversations)
    }

    async fn history(&self, peer: &str) -> Result<Vec<Message>> {
        let url = self.endpoint(&[peer])?;
        debug!("GET {}", url);
        let resp = self
            .client
            .get(url)
            .header(CALLER_HEADER, &self.identity)
            .send()
            .await?;
        let body: HistoryResponse = Self::decode(resp).await?;
        Ok(body.messages)
    }

    async fn send(&self, peer: &str, input: &SendMessageInput) -> Result<Message> {
        let url = self.endpoint(&["send", peer])?;
        debug!("POST {}", url);
        let resp = self
            .client
            .post(url)
            .header(CALLER_HEADER, &self.identity)
            .json(input)
            .send()
            .await?;
        let body: SendMessageResponse = Self::decode(resp).await?;
        Ok(body.message)
    }

    async fn mark_seen(&self, message_id: &str) -> Result<()> {
        let url = self.endpoint(&["mark", message_id])?;
        debug!("PUT {}", url);
        let resp = self
            .client
            .put(url)
            .header(CALLER_HEADER, &self.identity)
            .send()
            .await?;
        let _: serde_json::Value = Self::decode(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_paths() {
        let api = HttpMessageApi::new("http://localhost:5000", "alice").unwrap();
        assert_eq!(
            api.endpoint(&["conversations"]).unwrap().as_str(),
            "http://localhost:5000/api/messages/conversations"
        );
        assert_eq!(
            api.endpoint(&["send", "bob"]).unwrap().as_str(),
            "http://localhost:5000/api/messages/send/bob"
        );
    }

    #[test]
    fn test_endpoint_escapes_peer_id() {
        let api = HttpMessageApi::new("http://localhost:5000/", "alice").unwrap();
        assert_eq!(
            api.endpoint(&["bob smith"]).unwrap().as_str(),
            "http://localhost:5000/api/messages/bob%20smith"
        );
    }

    #[test]
    fn test_rejects_bad_url() {
        assert!(matches!(
            HttpMessageApi::new("not a url", "alice"),
            Err(ClientError::Url(_))
        ));
    }
}
