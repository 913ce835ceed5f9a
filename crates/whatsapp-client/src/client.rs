//! WhatsApp bridge HTTP client.

use crate::error::WhatsAppError;
use crate::messenger::Messenger;
use crate::types::*;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use urlencoding::encode;

/// WhatsApp REST bridge client.
#[derive(Clone)]
pub struct WhatsAppClient {
    client: Client,
    base_url: String,
}

impl WhatsAppClient {
    /// Create a new WhatsApp client.
    pub fn new(base_url: impl Into<String>) -> Result<Self, WhatsAppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if the bridge is healthy.
    pub async fn health_check(&self) -> bool {
        self.client
            .get(format!("{}/v1/health", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    /// Get the account the bridge session is logged in as.
    #[instrument(skip(self))]
    pub async fn get_account(&self) -> Result<Account, WhatsAppError> {
        let response = self
            .client
            .get(format!("{}/v1/me", self.base_url))
            .send()
            .await?;

        parse_json(response).await
    }

    /// Receive pending events.
    #[instrument(skip(self))]
    pub async fn receive(&self) -> Result<Vec<IncomingEvent>, WhatsAppError> {
        let response = self
            .client
            .get(format!("{}/v1/receive", self.base_url))
            .send()
            .await?;

        let events: Vec<IncomingEvent> = parse_json(response).await?;
        if !events.is_empty() {
            debug!("Received {} events", events.len());
        }
        Ok(events)
    }

    fn chat_url(&self, chat_id: &str) -> String {
        format!("{}/v1/chats/{}", self.base_url, encode(chat_id))
    }
}

#[async_trait]
impl Messenger for WhatsAppClient {
    #[instrument(skip(self, message), fields(mentions = message.mentions.len()))]
    async fn send_text(
        &self,
        chat_id: &str,
        message: &OutgoingText,
    ) -> Result<SentMessage, WhatsAppError> {
        let response = self
            .client
            .post(format!("{}/messages", self.chat_url(chat_id)))
            .json(message)
            .send()
            .await?;

        if !response.status().is_success() {
            let msg = response.text().await.unwrap_or_default();
            warn!("Send failed: {}", msg);
            return Err(WhatsAppError::SendFailed(msg));
        }

        let sent: SentMessage = response.json().await?;
        debug!("Sent message {} to {}", sent.id, chat_id);
        Ok(sent)
    }

    #[instrument(skip(self, media), fields(mimetype = %media.mimetype))]
    async fn send_media(
        &self,
        chat_id: &str,
        media: &OutgoingMedia,
    ) -> Result<SentMessage, WhatsAppError> {
        let response = self
            .client
            .post(format!("{}/media", self.chat_url(chat_id)))
            .json(media)
            .send()
            .await?;

        if !response.status().is_success() {
            let msg = response.text().await.unwrap_or_default();
            warn!("Media send failed: {}", msg);
            return Err(WhatsAppError::SendFailed(msg));
        }

        Ok(response.json().await?)
    }

    #[instrument(skip(self))]
    async fn delete_message(
        &self,
        chat_id: &str,
        message_id: &str,
        for_everyone: bool,
    ) -> Result<(), WhatsAppError> {
        let response = self
            .client
            .delete(format!(
                "{}/messages/{}",
                self.chat_url(chat_id),
                encode(message_id)
            ))
            .query(&[("everyone", for_everyone)])
            .send()
            .await?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(WhatsAppError::NotFound(message_id.to_string())),
            s => Err(WhatsAppError::Api {
                status: s.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }

    #[instrument(skip(self))]
    async fn fetch_messages(
        &self,
        chat_id: &str,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<BotMessage>, WhatsAppError> {
        let mut request = self
            .client
            .get(format!("{}/messages", self.chat_url(chat_id)))
            .query(&[("limit", limit.to_string())]);
        if let Some(before) = before {
            request = request.query(&[("before", before)]);
        }

        let wire: Vec<WireMessage> = parse_json(request.send().await?).await?;
        Ok(wire.iter().map(BotMessage::from_wire).collect())
    }

    #[instrument(skip(self))]
    async fn download_media(&self, message_id: &str) -> Result<MediaPayload, WhatsAppError> {
        let response = self
            .client
            .get(format!(
                "{}/v1/messages/{}/media",
                self.base_url,
                encode(message_id)
            ))
            .send()
            .await?;

        parse_json(response).await
    }

    #[instrument(skip(self))]
    async fn get_chat(&self, chat_id: &str) -> Result<ChatInfo, WhatsAppError> {
        let response = self.client.get(self.chat_url(chat_id)).send().await?;
        parse_json(response).await
    }

    #[instrument(skip(self))]
    async fn find_group(&self, name: &str) -> Result<Option<ChatInfo>, WhatsAppError> {
        let response = self
            .client
            .get(format!("{}/v1/groups", self.base_url))
            .query(&[("name", name)])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        parse_json(response).await.map(Some)
    }
}

/// Decode a successful JSON response or turn the status into an error.
async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, WhatsAppError> {
    let status = response.status();

    if status.is_success() {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(WhatsAppError::from)
    } else if status == StatusCode::NOT_FOUND {
        Err(WhatsAppError::NotFound(response.url().path().to_string()))
    } else {
        let message = response.text().await.unwrap_or_default();
        Err(WhatsAppError::Api {
            status: status.as_u16(),
            message,
        })
    }
}
