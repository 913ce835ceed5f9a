//! Tag command - mentions group members selected by a tag.

use crate::catalog::{CommandName, ErrorKind};
use crate::commands::{CommandContext, CommandHandler};
use crate::error::AppResult;
use crate::tags::{select_members, TagBook};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument};
use whatsapp_client::{user_part, OutgoingText};

pub struct TagHandler {
    tags: Arc<TagBook>,
    bot_id: String,
}

impl TagHandler {
    pub fn new(tags: Arc<TagBook>, bot_id: impl Into<String>) -> Self {
        Self {
            tags,
            bot_id: bot_id.into(),
        }
    }
}

#[async_trait]
impl CommandHandler for TagHandler {
    fn command(&self) -> CommandName {
        CommandName::Tag
    }

    #[instrument(skip(self, ctx), fields(chat = %ctx.chat_id()))]
    async fn execute(&self, ctx: &CommandContext<'_>) -> AppResult<()> {
        if !ctx.message.is_group {
            return ctx.reply_error(ErrorKind::GroupOnly).await;
        }

        let input = ctx.input.trim();
        let (token, rest) = input
            .split_once(char::is_whitespace)
            .map(|(t, r)| (t, r.trim()))
            .unwrap_or((input, ""));

        let Some(target) = self.tags.resolve(token, ctx.message.chat_name.as_deref()) else {
            return ctx.reply_error(ErrorKind::InvalidFormat).await;
        };

        let chat = ctx.messenger().get_chat(ctx.chat_id()).await?;
        let members: Vec<String> = select_members(&target, &chat.participants)
            .into_iter()
            .filter(|p| p.id != self.bot_id)
            .map(|p| p.id.clone())
            .collect();

        if members.is_empty() {
            return ctx.reply_error(ErrorKind::NoMembers).await;
        }

        let handles = members
            .iter()
            .map(|id| format!("@{}", user_part(id)))
            .collect::<Vec<_>>()
            .join(" ");
        let header = if rest.is_empty() {
            format!("📢 {} chamou:", ctx.message.display_author())
        } else {
            format!("📢 {}", rest)
        };

        info!("Tagging {} members with {}", members.len(), token);
        ctx.send(OutgoingText::new(format!("{}\n\n{}", header, handles)).with_mentions(members))
            .await?;
        Ok(())
    }
}
