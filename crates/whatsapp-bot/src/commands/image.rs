//! Image command - generates an image from a description.

use crate::catalog::{CommandName, ErrorKind};
use crate::commands::{CommandContext, CommandHandler};
use crate::error::AppResult;
use async_trait::async_trait;
use llm_client::LlmClient;
use std::sync::Arc;
use tracing::{info, instrument};
use whatsapp_client::OutgoingMedia;

pub struct ImageHandler {
    llm: Arc<LlmClient>,
    model: String,
    size: String,
}

impl ImageHandler {
    pub fn new(llm: Arc<LlmClient>, model: String, size: String) -> Self {
        Self { llm, model, size }
    }
}

#[async_trait]
impl CommandHandler for ImageHandler {
    fn command(&self) -> CommandName {
        CommandName::Image
    }

    #[instrument(skip(self, ctx), fields(chat = %ctx.chat_id()))]
    async fn execute(&self, ctx: &CommandContext<'_>) -> AppResult<()> {
        let prompt = ctx.input.trim();
        if prompt.is_empty() {
            return ctx.reply_error(ErrorKind::NoPrompt).await;
        }

        let bytes = self
            .llm
            .generate_image(&self.model, prompt, &self.size)
            .await?;
        info!("Generated {} byte image", bytes.len());

        let mut media = OutgoingMedia::from_bytes("image/png", &bytes);
        media.filename = Some("imagem.png".into());
        media.caption = Some(prompt.to_string());
        media.quoted_message_id = Some(ctx.message.id.clone());
        ctx.send_media(media).await?;
        Ok(())
    }
}
