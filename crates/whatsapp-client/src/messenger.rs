//! Transport seam consumed by the bot core.

use crate::error::WhatsAppError;
use crate::types::*;
use async_trait::async_trait;

/// Outbound actions and lookups against a WhatsApp session.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send a text message, optionally with mentions and a quoted message.
    async fn send_text(&self, chat_id: &str, message: &OutgoingText)
        -> Result<SentMessage, WhatsAppError>;

    /// Send an image, audio or document.
    async fn send_media(&self, chat_id: &str, media: &OutgoingMedia)
        -> Result<SentMessage, WhatsAppError>;

    /// Delete a message, for everyone or only for the bot.
    async fn delete_message(
        &self,
        chat_id: &str,
        message_id: &str,
        for_everyone: bool,
    ) -> Result<(), WhatsAppError>;

    /// Most recent messages of a chat, oldest first.
    async fn fetch_messages(
        &self,
        chat_id: &str,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<BotMessage>, WhatsAppError>;

    async fn download_media(&self, message_id: &str) -> Result<MediaPayload, WhatsAppError>;

    async fn get_chat(&self, chat_id: &str) -> Result<ChatInfo, WhatsAppError>;

    /// Look up a group the bot is in by its display name.
    async fn find_group(&self, name: &str) -> Result<Option<ChatInfo>, WhatsAppError>;

    /// Reply to a message, quoting it.
    async fn reply(&self, original: &BotMessage, text: &str) -> Result<SentMessage, WhatsAppError> {
        let message = OutgoingText::new(text).quoting(original.id.clone());
        self.send_text(original.reply_target(), &message).await
    }
}
