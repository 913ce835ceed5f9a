//! Cache clear command - empties the news cache.

use crate::catalog::CommandName;
use crate::commands::{CommandContext, CommandHandler, NewsCache};
use crate::error::AppResult;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub struct CacheClearHandler {
    cache: Arc<NewsCache>,
}

impl CacheClearHandler {
    pub fn new(cache: Arc<NewsCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl CommandHandler for CacheClearHandler {
    fn command(&self) -> CommandName {
        CommandName::CacheClear
    }

    async fn execute(&self, ctx: &CommandContext<'_>) -> AppResult<()> {
        let cleared = self.cache.clear().await;
        info!("Cleared {} cached news answers", cleared);

        let text = if cleared == 0 {
            "O cache de notícias já estava vazio.".to_string()
        } else {
            format!("🧹 Cache de notícias limpo ({} entradas).", cleared)
        };
        ctx.reply(&text).await?;
        Ok(())
    }
}
