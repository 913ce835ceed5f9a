//! Bot command handlers.

mod audio;
mod cache_clear;
mod chat;
mod configure;
mod help;
mod image;
mod news;
mod resumo;
mod tag;

pub use audio::AudioHandler;
pub use cache_clear::CacheClearHandler;
pub use chat::ChatHandler;
pub use configure::ConfigureHandler;
pub use help::HelpHandler;
pub use image::ImageHandler;
pub use news::{NewsCache, NewsHandler};
pub use resumo::{ResumoHandler, SummaryWindow};
pub use tag::TagHandler;

use crate::autodelete::{AutoDeleteQueue, MessageRef};
use crate::catalog::{CommandName, CommandSpec, ErrorKind};
use crate::error::AppResult;
use crate::intent::AttachmentHint;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use whatsapp_client::{BotMessage, Messenger, OutgoingMedia, OutgoingText, SentMessage};

/// Command handler trait.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// The command this handler serves.
    fn command(&self) -> CommandName;

    /// Execute the command. Input problems are answered through
    /// `ctx.reply_error` and are not errors.
    async fn execute(&self, ctx: &CommandContext<'_>) -> AppResult<()>;
}

/// Command name -> handler, filled once at startup.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<CommandName, Arc<dyn CommandHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn CommandHandler>) -> &mut Self {
        let command = handler.command();
        if self.handlers.insert(command, handler).is_some() {
            warn!("Handler for {} replaced", command);
        }
        self
    }

    pub fn get(&self, command: CommandName) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(&command).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Everything a handler needs for one invocation: the real inbound message,
/// the resolved command and reply helpers that honor the auto-delete policy.
pub struct CommandContext<'a> {
    pub message: &'a BotMessage,
    pub spec: &'a CommandSpec,
    pub input: &'a str,
    pub hint: Option<&'a AttachmentHint>,
    messenger: &'a dyn Messenger,
    queue: &'a AutoDeleteQueue,
}

impl<'a> CommandContext<'a> {
    pub fn new(
        message: &'a BotMessage,
        spec: &'a CommandSpec,
        input: &'a str,
        hint: Option<&'a AttachmentHint>,
        messenger: &'a dyn Messenger,
        queue: &'a AutoDeleteQueue,
    ) -> Self {
        Self {
            message,
            spec,
            input,
            hint,
            messenger,
            queue,
        }
    }

    pub fn messenger(&self) -> &dyn Messenger {
        self.messenger
    }

    pub fn chat_id(&self) -> &str {
        self.message.reply_target()
    }

    /// Reply quoting the triggering message.
    pub async fn reply(&self, text: &str) -> AppResult<SentMessage> {
        let message = OutgoingText::new(text).quoting(self.message.id.clone());
        self.send(message).await
    }

    pub async fn send(&self, message: OutgoingText) -> AppResult<SentMessage> {
        let sent = self.messenger.send_text(self.chat_id(), &message).await?;
        self.schedule(&sent, self.spec.auto_delete.command_messages).await;
        Ok(sent)
    }

    pub async fn send_media(&self, media: OutgoingMedia) -> AppResult<SentMessage> {
        let sent = self.messenger.send_media(self.chat_id(), &media).await?;
        self.schedule(&sent, self.spec.auto_delete.command_messages).await;
        Ok(sent)
    }

    /// Reply with one of the command's error messages. Kinds without a
    /// message fall back to the generic one.
    pub async fn reply_error(&self, kind: ErrorKind) -> AppResult<()> {
        let Some(text) = self
            .spec
            .error_message(kind)
            .or_else(|| self.spec.error_message(ErrorKind::Error))
        else {
            return Ok(());
        };

        let message = OutgoingText::new(text).quoting(self.message.id.clone());
        let sent = self.messenger.send_text(self.chat_id(), &message).await?;
        self.schedule(&sent, self.spec.auto_delete.error_messages).await;
        Ok(())
    }

    async fn schedule(&self, sent: &SentMessage, enabled: bool) {
        if enabled {
            self.queue
                .enqueue(
                    MessageRef::new(self.chat_id(), sent.id.clone()),
                    self.spec.auto_delete.delete_timeout,
                )
                .await;
        }
    }
}
