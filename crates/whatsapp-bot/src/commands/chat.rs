//! Chat command - free-form questions to the completion provider.

use crate::catalog::{CommandName, ErrorKind};
use crate::commands::{CommandContext, CommandHandler};
use crate::config::system_prompt_with_date;
use crate::error::AppResult;
use async_trait::async_trait;
use llm_client::{LlmClient, LlmError, Message};
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub struct ChatHandler {
    llm: Arc<LlmClient>,
    system_prompt: String,
}

impl ChatHandler {
    pub fn new(llm: Arc<LlmClient>, system_prompt: String) -> Self {
        Self { llm, system_prompt }
    }

    fn build_messages(&self, question: &str, quoted: Option<&str>) -> Vec<Message> {
        let mut messages = vec![Message::system(system_prompt_with_date(&self.system_prompt))];
        if let Some(quoted) = quoted {
            messages.push(Message::user(format!("Mensagem citada:\n{}", quoted)));
        }
        messages.push(Message::user(question));
        messages
    }
}

#[async_trait]
impl CommandHandler for ChatHandler {
    fn command(&self) -> CommandName {
        CommandName::ChatGpt
    }

    #[instrument(skip(self, ctx), fields(chat = %ctx.chat_id()))]
    async fn execute(&self, ctx: &CommandContext<'_>) -> AppResult<()> {
        let question = ctx.input.trim();
        if question.is_empty() {
            return ctx.reply_error(ErrorKind::NoPrompt).await;
        }

        let quoted = ctx
            .message
            .quoted
            .as_ref()
            .map(|q| q.body.trim())
            .filter(|body| !body.is_empty());

        info!(
            "Question from {}: {}...",
            ctx.message.display_author(),
            question.chars().take(50).collect::<String>()
        );

        let answer = match self
            .llm
            .chat_with_retry(self.build_messages(question, quoted), Some(0.7), None, Some(2))
            .await
        {
            Ok(answer) => answer,
            Err(LlmError::RateLimit) => {
                warn!("Provider rate limited");
                ctx.reply("Estou recebendo muitas perguntas agora. Tente de novo em instantes.")
                    .await?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        ctx.reply(answer.trim()).await?;
        Ok(())
    }
}
