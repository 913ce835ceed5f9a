//! Help command - lists the commands available in the chat.

use crate::catalog::{CommandName, CommandRegistry};
use crate::commands::{CommandContext, CommandHandler};
use crate::error::AppResult;
use crate::permissions::PermissionGate;
use crate::tags::TagBook;
use async_trait::async_trait;
use std::sync::Arc;

pub struct HelpHandler {
    registry: Arc<CommandRegistry>,
    tags: Arc<TagBook>,
    gate: Arc<PermissionGate>,
}

impl HelpHandler {
    pub fn new(registry: Arc<CommandRegistry>, tags: Arc<TagBook>, gate: Arc<PermissionGate>) -> Self {
        Self {
            registry,
            tags,
            gate,
        }
    }
}

#[async_trait]
impl CommandHandler for HelpHandler {
    fn command(&self) -> CommandName {
        CommandName::CommandList
    }

    async fn execute(&self, ctx: &CommandContext<'_>) -> AppResult<()> {
        let mut lines = vec!["🤖 *Comandos disponíveis*".to_string(), String::new()];

        for spec in self.registry.specs() {
            let decision = self
                .gate
                .is_allowed(spec.name, ctx.chat_id(), &ctx.message.author)
                .await;
            if !decision.allowed {
                continue;
            }
            let triggers = if spec.prefixes.is_empty() {
                "@tag".to_string()
            } else {
                spec.prefixes.join(", ")
            };
            lines.push(format!("*{}* - {}", triggers, spec.description));
        }

        if ctx.message.is_group {
            let tags = self.tags.tags_for(ctx.message.chat_name.as_deref());
            if !tags.is_empty() {
                lines.push(String::new());
                lines.push(format!("🏷️ Tags: {}", tags.join(", ")));
            }
        }

        lines.push(String::new());
        lines.push("Você também pode me mencionar e pedir em linguagem natural.".into());

        ctx.reply(&lines.join("\n")).await?;
        Ok(())
    }
}
