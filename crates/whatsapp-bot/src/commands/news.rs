//! News command - search-augmented answers, cached per topic.

use crate::catalog::{CommandName, ErrorKind};
use crate::commands::{CommandContext, CommandHandler};
use crate::config::system_prompt_with_date;
use crate::error::AppResult;
use async_trait::async_trait;
use llm_client::{LlmClient, Message};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

const NEWS_PROMPT: &str = "Você é um assistente de notícias. Pesquise as notícias mais \
recentes sobre o assunto pedido e responda em português com até 5 itens curtos, \
cada um com a fonte e o link.";

struct CachedAnswer {
    answer: String,
    expires_at: Instant,
}

/// Topic -> answer, expiring after a TTL.
pub struct NewsCache {
    entries: RwLock<HashMap<String, CachedAnswer>>,
    ttl: Duration,
}

impl NewsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    fn key(topic: &str) -> String {
        topic.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
    }

    pub async fn get(&self, topic: &str) -> Option<String> {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .get(&Self::key(topic))
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.answer.clone())
    }

    pub async fn insert(&self, topic: &str, answer: String) {
        let expires_at = Instant::now() + self.ttl;
        self.entries
            .write()
            .await
            .insert(Self::key(topic), CachedAnswer { answer, expires_at });
    }

    /// Drop everything, returning how many entries were held.
    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.write().await;
        let count = entries.len();
        entries.clear();
        count
    }
}

pub struct NewsHandler {
    llm: Arc<LlmClient>,
    cache: Arc<NewsCache>,
    model: String,
}

impl NewsHandler {
    /// `model` should have web search; it defaults to the chat model in config.
    pub fn new(llm: Arc<LlmClient>, cache: Arc<NewsCache>, model: String) -> Self {
        Self { llm, cache, model }
    }
}

#[async_trait]
impl CommandHandler for NewsHandler {
    fn command(&self) -> CommandName {
        CommandName::News
    }

    #[instrument(skip(self, ctx), fields(topic = %ctx.input))]
    async fn execute(&self, ctx: &CommandContext<'_>) -> AppResult<()> {
        let topic = ctx.input.trim();
        if topic.is_empty() {
            return ctx.reply_error(ErrorKind::NoPrompt).await;
        }

        if let Some(answer) = self.cache.get(topic).await {
            debug!("News cache hit");
            ctx.reply(&answer).await?;
            return Ok(());
        }

        let answer = self
            .llm
            .chat_with_model(
                &self.model,
                vec![
                    Message::system(system_prompt_with_date(NEWS_PROMPT)),
                    Message::user(topic),
                ],
                None,
                None,
            )
            .await?;
        let answer = format!("📰 *{}*\n\n{}", topic, answer.trim());

        info!("News fetched with {}", self.model);
        self.cache.insert(topic, answer.clone()).await;
        ctx.reply(&answer).await?;
        Ok(())
    }
}
