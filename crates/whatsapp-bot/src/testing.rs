//! In-memory transport used by unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use whatsapp_client::*;

pub const BOT_ID: &str = "5511900000000@c.us";
pub const ADMIN: &str = "5511911111111@c.us";
pub const USER: &str = "5511922222222@c.us";
pub const GROUP: &str = "120363041234@g.us";

/// Records outbound traffic and serves canned chats, history and media.
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<(String, OutgoingText)>>,
    media_sent: Mutex<Vec<(String, OutgoingMedia)>>,
    deleted: Mutex<Vec<(String, String)>>,
    history: Mutex<HashMap<String, Vec<BotMessage>>>,
    chats: Mutex<HashMap<String, ChatInfo>>,
    media: Mutex<HashMap<String, MediaPayload>>,
    fail_groups: AtomicBool,
    next_id: AtomicUsize,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_chat(&self, chat: ChatInfo) {
        self.chats.lock().unwrap().insert(chat.id.clone(), chat);
    }

    /// Groups are found by name through `find_group`.
    pub fn add_group(&self, chat: ChatInfo) {
        self.add_chat(chat);
    }

    pub fn add_history(&self, message: BotMessage) {
        self.history
            .lock()
            .unwrap()
            .entry(message.chat_id.clone())
            .or_default()
            .push(message);
    }

    pub fn add_media(&self, message_id: &str, payload: MediaPayload) {
        self.media
            .lock()
            .unwrap()
            .insert(message_id.to_string(), payload);
    }

    pub fn fail_group_lookups(&self) {
        self.fail_groups.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, OutgoingText)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|(_, m)| m.text).collect()
    }

    pub fn media_sent(&self) -> Vec<(String, OutgoingMedia)> {
        self.media_sent.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<(String, String)> {
        self.deleted.lock().unwrap().clone()
    }

    fn record(&self, chat_id: &str, text: &str) -> SentMessage {
        let id = format!("sent-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut message = message(&id, chat_id, BOT_ID, text);
        message.from_me = true;
        self.add_history(message);
        SentMessage {
            id,
            timestamp: None,
        }
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_text(
        &self,
        chat_id: &str,
        message: &OutgoingText,
    ) -> Result<SentMessage, WhatsAppError> {
        self.sent
            .lock()
            .unwrap()
            .push((chat_id.to_string(), message.clone()));
        Ok(self.record(chat_id, &message.text))
    }

    async fn send_media(
        &self,
        chat_id: &str,
        media: &OutgoingMedia,
    ) -> Result<SentMessage, WhatsAppError> {
        self.media_sent
            .lock()
            .unwrap()
            .push((chat_id.to_string(), media.clone()));
        Ok(self.record(chat_id, media.caption.as_deref().unwrap_or_default()))
    }

    async fn delete_message(
        &self,
        chat_id: &str,
        message_id: &str,
        _for_everyone: bool,
    ) -> Result<(), WhatsAppError> {
        let mut history = self.history.lock().unwrap();
        let messages = history.entry(chat_id.to_string()).or_default();
        let before = messages.len();
        messages.retain(|m| m.id != message_id);
        if messages.len() == before {
            return Err(WhatsAppError::NotFound(message_id.to_string()));
        }
        self.deleted
            .lock()
            .unwrap()
            .push((chat_id.to_string(), message_id.to_string()));
        Ok(())
    }

    async fn fetch_messages(
        &self,
        chat_id: &str,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<BotMessage>, WhatsAppError> {
        let history = self.history.lock().unwrap();
        let messages = history.get(chat_id).cloned().unwrap_or_default();
        let end = before
            .and_then(|id| messages.iter().position(|m| m.id == id))
            .unwrap_or(messages.len());
        let start = end.saturating_sub(limit);
        Ok(messages[start..end].to_vec())
    }

    async fn download_media(&self, message_id: &str) -> Result<MediaPayload, WhatsAppError> {
        self.media
            .lock()
            .unwrap()
            .get(message_id)
            .cloned()
            .ok_or_else(|| WhatsAppError::NotFound(message_id.to_string()))
    }

    async fn get_chat(&self, chat_id: &str) -> Result<ChatInfo, WhatsAppError> {
        self.chats
            .lock()
            .unwrap()
            .get(chat_id)
            .cloned()
            .ok_or_else(|| WhatsAppError::NotFound(chat_id.to_string()))
    }

    async fn find_group(&self, name: &str) -> Result<Option<ChatInfo>, WhatsAppError> {
        if self.fail_groups.load(Ordering::SeqCst) {
            return Err(WhatsAppError::Api {
                status: 500,
                message: "bridge down".into(),
            });
        }
        Ok(self
            .chats
            .lock()
            .unwrap()
            .values()
            .find(|c| c.is_group && c.name == name)
            .cloned())
    }
}

/// A text message from `author` in `chat_id`.
pub fn message(id: &str, chat_id: &str, author: &str, text: &str) -> BotMessage {
    BotMessage {
        id: id.to_string(),
        chat_id: chat_id.to_string(),
        author: author.to_string(),
        author_name: None,
        text: text.to_string(),
        timestamp: chrono::Utc::now().timestamp(),
        is_group: chat_id.ends_with(GROUP_SUFFIX),
        chat_name: None,
        from_me: false,
        message_type: MessageType::Chat,
        has_media: false,
        mentioned_ids: Vec::new(),
        quoted: None,
    }
}

pub fn group_message(id: &str, author: &str, text: &str) -> BotMessage {
    let mut msg = message(id, GROUP, author, text);
    msg.chat_name = Some("Amigos".to_string());
    msg
}

pub fn direct_message(id: &str, author: &str, text: &str) -> BotMessage {
    message(id, author, author, text)
}

pub fn participant(id: &str, name: &str, is_admin: bool) -> Participant {
    Participant {
        id: id.to_string(),
        name: Some(name.to_string()),
        is_admin,
    }
}
