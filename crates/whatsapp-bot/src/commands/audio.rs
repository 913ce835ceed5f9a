//! Audio command - transcribes a voice note or audio file.

use crate::catalog::{CommandName, ErrorKind};
use crate::commands::{CommandContext, CommandHandler};
use crate::error::AppResult;
use async_trait::async_trait;
use llm_client::LlmClient;
use std::sync::Arc;
use tracing::{info, instrument};

pub struct AudioHandler {
    llm: Arc<LlmClient>,
    model: String,
}

impl AudioHandler {
    pub fn new(llm: Arc<LlmClient>, model: String) -> Self {
        Self { llm, model }
    }

    /// The hinted attachment, else the quoted audio, else the message itself.
    fn target<'a>(ctx: &'a CommandContext<'_>) -> Option<&'a str> {
        if let Some(hint) = ctx.hint {
            return Some(hint.message_id());
        }
        if let Some(quoted) = &ctx.message.quoted {
            if quoted.message_type.is_audio() {
                return Some(&quoted.id);
            }
        }
        ctx.message
            .message_type
            .is_audio()
            .then_some(ctx.message.id.as_str())
    }
}

#[async_trait]
impl CommandHandler for AudioHandler {
    fn command(&self) -> CommandName {
        CommandName::Audio
    }

    #[instrument(skip(self, ctx), fields(chat = %ctx.chat_id()))]
    async fn execute(&self, ctx: &CommandContext<'_>) -> AppResult<()> {
        let Some(target) = Self::target(ctx) else {
            return ctx.reply_error(ErrorKind::NoMedia).await;
        };

        let media = ctx.messenger().download_media(target).await?;
        let bytes = media.bytes()?;
        let filename = media.filename.clone().unwrap_or_else(|| "audio.ogg".into());

        let text = self
            .llm
            .transcribe(&self.model, bytes, &filename, &media.mimetype)
            .await?;
        info!("Transcribed {} chars", text.len());

        ctx.reply(&format!("🎙️ *Transcrição*\n\n{}", text.trim())).await?;
        Ok(())
    }
}
