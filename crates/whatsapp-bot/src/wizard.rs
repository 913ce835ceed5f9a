//! Wizard conversations: per (user, chat) ownership and the configuration flow.

use crate::autodelete::{AutoDeleteQueue, MessageRef};
use crate::catalog::{AutoDeletePolicy, CommandName};
use crate::error::AppResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};
use whatsapp_client::{BotMessage, Messenger};

/// Wizards are owned per user per chat.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WizardKey {
    pub user_id: String,
    pub chat_id: String,
}

impl WizardKey {
    pub fn new(user_id: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            chat_id: chat_id.into(),
        }
    }

    pub fn for_message(message: &BotMessage) -> Self {
        Self::new(message.author.clone(), message.chat_id.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WizardState {
    pub command: CommandName,
}

/// Storage for active wizards.
#[async_trait]
pub trait WizardStateStore: Send + Sync {
    async fn get(&self, key: &WizardKey) -> Option<WizardState>;

    async fn set(&self, key: WizardKey, state: WizardState);

    /// Returns whether a wizard was active.
    async fn clear(&self, key: &WizardKey) -> bool;

    async fn is_active(&self, key: &WizardKey) -> bool {
        self.get(key).await.is_some()
    }
}

struct WizardEntry {
    state: WizardState,
    expires_at: Instant,
}

/// In-memory store; abandoned wizards expire after `ttl`.
pub struct InMemoryWizardStore {
    entries: RwLock<HashMap<WizardKey, WizardEntry>>,
    ttl: Duration,
}

impl InMemoryWizardStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Remove expired entries, returning how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Background task that periodically removes expired wizards.
    pub fn spawn_cleanup(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let removed = store.purge_expired().await;
                if removed > 0 {
                    debug!("Released {} abandoned wizards", removed);
                }
            }
        })
    }
}

#[async_trait]
impl WizardStateStore for InMemoryWizardStore {
    async fn get(&self, key: &WizardKey) -> Option<WizardState> {
        let entries = self.entries.read().await;
        let now = Instant::now();
        entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.state.clone())
    }

    async fn set(&self, key: WizardKey, state: WizardState) {
        let expires_at = Instant::now() + self.ttl;
        self.entries
            .write()
            .await
            .insert(key, WizardEntry { state, expires_at });
    }

    async fn clear(&self, key: &WizardKey) -> bool {
        self.entries.write().await.remove(key).is_some()
    }
}

/// Per-chat settings changed through the wizard.
#[derive(Default)]
pub struct ChatSettings {
    summary_sizes: RwLock<HashMap<String, usize>>,
}

impl ChatSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn summary_size(&self, chat_id: &str) -> Option<usize> {
        self.summary_sizes.read().await.get(chat_id).copied()
    }

    pub async fn set_summary_size(&self, chat_id: &str, size: usize) {
        self.summary_sizes
            .write()
            .await
            .insert(chat_id.to_string(), size);
    }
}

const CANCEL_WORD: &str = "cancelar";

/// Asks for the chat's default summary size.
pub struct ConfigWizard {
    store: Arc<dyn WizardStateStore>,
    settings: Arc<ChatSettings>,
    messenger: Arc<dyn Messenger>,
    queue: Arc<AutoDeleteQueue>,
    policy: AutoDeletePolicy,
    max_summary: usize,
}

impl ConfigWizard {
    pub fn new(
        store: Arc<dyn WizardStateStore>,
        settings: Arc<ChatSettings>,
        messenger: Arc<dyn Messenger>,
        queue: Arc<AutoDeleteQueue>,
        policy: AutoDeletePolicy,
        max_summary: usize,
    ) -> Self {
        Self {
            store,
            settings,
            messenger,
            queue,
            policy,
            max_summary,
        }
    }

    /// Take ownership of the conversation and ask the first question.
    #[instrument(skip(self, message), fields(chat = %message.chat_id))]
    pub async fn begin(&self, message: &BotMessage) -> AppResult<()> {
        self.store
            .set(
                WizardKey::for_message(message),
                WizardState {
                    command: CommandName::Configurar,
                },
            )
            .await;
        info!("Configuration wizard started");

        self.answer(
            message,
            &format!(
                "⚙️ *Configuração*\n\nQuantas mensagens o #resumo deve resumir por padrão \
                 neste chat? Responda com um número de 1 a {}, ou _{}_.",
                self.max_summary, CANCEL_WORD
            ),
        )
        .await
    }

    /// Handle a message if its author is inside a wizard in this chat.
    /// Returns whether the message was consumed.
    pub async fn handle(&self, message: &BotMessage) -> AppResult<bool> {
        let key = WizardKey::for_message(message);
        if !self.store.is_active(&key).await {
            return Ok(false);
        }

        let answer = message.text.trim().to_lowercase();
        if answer == CANCEL_WORD {
            self.store.clear(&key).await;
            self.answer(message, "Configuração cancelada.").await?;
            return Ok(true);
        }

        match answer.parse::<usize>() {
            Ok(size) if (1..=self.max_summary).contains(&size) => {
                self.settings.set_summary_size(&message.chat_id, size).await;
                self.store.clear(&key).await;
                info!("Default summary size for {} set to {}", message.chat_id, size);
                self.answer(
                    message,
                    &format!("✅ Pronto! O #resumo agora resume as últimas {} mensagens.", size),
                )
                .await?;
            }
            _ => {
                self.answer(
                    message,
                    &format!(
                        "Envie um número de 1 a {}, ou _{}_ para sair.",
                        self.max_summary, CANCEL_WORD
                    ),
                )
                .await?;
            }
        }
        Ok(true)
    }

    async fn answer(&self, message: &BotMessage, text: &str) -> AppResult<()> {
        let sent = self.messenger.reply(message, text).await?;
        if self.policy.command_messages {
            let timeout = self.policy.delete_timeout;
            self.queue
                .enqueue(MessageRef::new(&message.chat_id, sent.id), timeout)
                .await;
            self.queue
                .enqueue(MessageRef::new(&message.chat_id, &message.id), timeout)
                .await;
        }
        Ok(())
    }
}
