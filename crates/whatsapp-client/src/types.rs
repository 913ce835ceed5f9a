//! WhatsApp bridge API types.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Server suffix of a person's identifier (direct chats use it as chat id).
pub const DIRECT_SUFFIX: &str = "@c.us";

/// Server suffix of a group chat identifier.
pub const GROUP_SUFFIX: &str = "@g.us";

/// Whether the identifier names a one-to-one chat.
pub fn is_direct_chat(id: &str) -> bool {
    id.ends_with(DIRECT_SUFFIX)
}

/// The number part of an identifier ("5511999@c.us" -> "5511999").
pub fn user_part(id: &str) -> &str {
    id.split('@').next().unwrap_or(id)
}

/// WhatsApp message kind as reported by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Chat,
    Image,
    Video,
    Audio,
    Ptt,
    Sticker,
    Document,
    #[serde(other)]
    Other,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Chat => "chat",
            MessageType::Image => "image",
            MessageType::Video => "video",
            MessageType::Audio => "audio",
            MessageType::Ptt => "ptt",
            MessageType::Sticker => "sticker",
            MessageType::Document => "document",
            MessageType::Other => "other",
        }
    }

    /// Audio file or voice note.
    pub fn is_audio(&self) -> bool {
        matches!(self, MessageType::Audio | MessageType::Ptt)
    }
}

/// Event delivered by the receive endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingEvent {
    pub event: String,
    #[serde(default)]
    pub message: Option<WireMessage>,
}

/// Message as serialized by the bridge.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub id: String,
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    /// Sender inside a group; absent for direct chats.
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub notify_name: Option<String>,
    #[serde(default)]
    pub body: String,
    pub timestamp: i64,
    #[serde(rename = "type", default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub has_media: bool,
    #[serde(default)]
    pub mentioned_ids: Vec<String>,
    #[serde(default)]
    pub quoted_msg: Option<QuotedMessage>,
    #[serde(default)]
    pub chat_name: Option<String>,
}

/// The message an inbound message replies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotedMessage {
    pub id: String,
    #[serde(default)]
    pub body: String,
    #[serde(rename = "type", default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub has_media: bool,
}

/// Parsed message for bot processing.
#[derive(Debug, Clone)]
pub struct BotMessage {
    /// Serialized message id, used to quote and delete.
    pub id: String,
    /// Chat the message belongs to (group id or peer id).
    pub chat_id: String,
    /// Person who wrote the message.
    pub author: String,
    /// Push name of the author, if known.
    pub author_name: Option<String>,
    /// The message text (caption for media messages).
    pub text: String,
    /// Unix timestamp in seconds.
    pub timestamp: i64,
    pub is_group: bool,
    pub chat_name: Option<String>,
    /// Sent by the bot's own account.
    pub from_me: bool,
    pub message_type: MessageType,
    pub has_media: bool,
    pub mentioned_ids: Vec<String>,
    pub quoted: Option<QuotedMessage>,
}

impl BotMessage {
    /// Build a bot message from its wire form.
    pub fn from_wire(msg: &WireMessage) -> Self {
        let chat_id = if msg.from_me {
            msg.to.clone().unwrap_or_else(|| msg.from.clone())
        } else {
            msg.from.clone()
        };
        let author = msg
            .author
            .clone()
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| msg.from.clone());

        Self {
            id: msg.id.clone(),
            is_group: chat_id.ends_with(GROUP_SUFFIX),
            chat_id,
            author,
            author_name: msg.notify_name.clone(),
            text: msg.body.clone(),
            timestamp: msg.timestamp,
            chat_name: msg.chat_name.clone(),
            from_me: msg.from_me,
            message_type: msg.message_type,
            has_media: msg.has_media,
            mentioned_ids: msg.mentioned_ids.clone(),
            quoted: msg.quoted_msg.clone(),
        }
    }

    /// Extract a bot message from a receive event.
    pub fn from_incoming(event: &IncomingEvent) -> Option<Self> {
        if event.event != "message" && event.event != "message_create" {
            return None;
        }
        event.message.as_ref().map(Self::from_wire)
    }

    pub fn has_quoted_msg(&self) -> bool {
        self.quoted.is_some()
    }

    /// Whether `id` is among the mentioned identifiers.
    pub fn mentions(&self, id: &str) -> bool {
        self.mentioned_ids.iter().any(|m| m == id)
    }

    /// Get the reply target (the chat the message came from).
    pub fn reply_target(&self) -> &str {
        &self.chat_id
    }

    /// Display name of the author, falling back to the number.
    pub fn display_author(&self) -> &str {
        self.author_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| user_part(&self.author))
    }
}

/// Chat metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub participants: Vec<Participant>,
}

impl ChatInfo {
    pub fn has_participant(&self, id: &str) -> bool {
        self.participants.iter().any(|p| p.id == id)
    }
}

/// Group participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

/// Downloaded media.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaPayload {
    pub mimetype: String,
    /// Base64 encoded content.
    pub data: String,
    #[serde(default)]
    pub filename: Option<String>,
}

impl MediaPayload {
    /// Decode the base64 content.
    pub fn bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(self.data.as_bytes())
    }
}

/// Outgoing text message request.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingText {
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quoted_message_id: Option<String>,
}

impl OutgoingText {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn quoting(mut self, message_id: impl Into<String>) -> Self {
        self.quoted_message_id = Some(message_id.into());
        self
    }

    pub fn with_mentions(mut self, mentions: Vec<String>) -> Self {
        self.mentions = mentions;
        self
    }
}

/// Outgoing media message request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMedia {
    pub mimetype: String,
    /// Base64 encoded content.
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quoted_message_id: Option<String>,
}

impl OutgoingMedia {
    pub fn from_bytes(mimetype: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mimetype: mimetype.into(),
            data: STANDARD.encode(bytes),
            filename: None,
            caption: None,
            quoted_message_id: None,
        }
    }
}

/// Send message response.
#[derive(Debug, Clone, Deserialize)]
pub struct SentMessage {
    pub id: String,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// The account the bridge is logged in as.
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub id: String,
    #[serde(default, rename = "pushname")]
    pub push_name: Option<String>,
}
