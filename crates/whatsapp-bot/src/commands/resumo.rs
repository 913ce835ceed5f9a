//! Resumo command - summarizes recent chat history.

use crate::catalog::{CommandName, ErrorKind};
use crate::commands::{CommandContext, CommandHandler};
use crate::config::system_prompt_with_date;
use crate::error::AppResult;
use crate::wizard::ChatSettings;
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, TimeZone};
use llm_client::{LlmClient, Message};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use whatsapp_client::BotMessage;

/// History page size when walking back through a time window.
const PAGE_SIZE: usize = 100;

const SUMMARY_PROMPT: &str = "Você resume conversas de grupos de WhatsApp. \
Escreva em português, em tópicos curtos, citando quem disse o quê quando for relevante. \
Ignore saudações e mensagens sem conteúdo.";

/// Which messages to summarize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryWindow {
    /// The last N messages.
    Count(usize),
    Today,
    Yesterday,
    Minutes(u32),
    Hours(u32),
}

impl SummaryWindow {
    /// `hoje`, `ontem`, `<N> minutos`, `<N> horas` or a plain message count.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim().to_lowercase();
        match input.as_str() {
            "hoje" => return Some(SummaryWindow::Today),
            "ontem" => return Some(SummaryWindow::Yesterday),
            _ => {}
        }

        let digits = input
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(input.len());
        if digits == 0 {
            return None;
        }
        let n: u32 = input[..digits].parse().ok().filter(|n| *n > 0)?;

        match input[digits..].trim() {
            "" => Some(SummaryWindow::Count(n as usize)),
            "m" | "min" | "mins" | "minuto" | "minutos" => Some(SummaryWindow::Minutes(n)),
            "h" | "hora" | "horas" => Some(SummaryWindow::Hours(n)),
            _ => None,
        }
    }

    /// Half-open unix-second range `[start, end)`; `None` for counts.
    pub fn bounds<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<(i64, i64)> {
        let ts = now.timestamp();
        match self {
            SummaryWindow::Count(_) => None,
            SummaryWindow::Minutes(n) => Some((ts - i64::from(*n) * 60, ts + 1)),
            SummaryWindow::Hours(n) => Some((ts - i64::from(*n) * 3600, ts + 1)),
            SummaryWindow::Today => {
                let start = start_of_day(now.date_naive(), &now.timezone())?;
                Some((start, ts + 1))
            }
            SummaryWindow::Yesterday => {
                let today = now.date_naive();
                let start = start_of_day(today.pred_opt()?, &now.timezone())?;
                let end = start_of_day(today, &now.timezone())?;
                Some((start, end))
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            SummaryWindow::Count(n) => format!("as últimas {} mensagens", n),
            SummaryWindow::Today => "as mensagens de hoje".into(),
            SummaryWindow::Yesterday => "as mensagens de ontem".into(),
            SummaryWindow::Minutes(n) => format!("as mensagens dos últimos {} minutos", n),
            SummaryWindow::Hours(n) => format!("as mensagens das últimas {} horas", n),
        }
    }
}

fn start_of_day<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> Option<i64> {
    date.and_hms_opt(0, 0, 0)?
        .and_local_timezone(tz.clone())
        .earliest()
        .map(|d| d.timestamp())
}

pub struct ResumoHandler {
    llm: Arc<LlmClient>,
    settings: Arc<ChatSettings>,
    default_size: usize,
    max_messages: usize,
}

impl ResumoHandler {
    pub fn new(
        llm: Arc<LlmClient>,
        settings: Arc<ChatSettings>,
        default_size: usize,
        max_messages: usize,
    ) -> Self {
        Self {
            llm,
            settings,
            default_size,
            max_messages,
        }
    }

    async fn collect(
        &self,
        ctx: &CommandContext<'_>,
        window: SummaryWindow,
    ) -> AppResult<Vec<BotMessage>> {
        let chat_id = ctx.chat_id();
        let trigger = ctx.message.id.as_str();

        let Some((start, end)) = window.bounds(&Local::now()) else {
            let n = match window {
                SummaryWindow::Count(n) => n.min(self.max_messages),
                _ => self.max_messages,
            };
            let fetched = ctx.messenger().fetch_messages(chat_id, n + 1, None).await?;
            let mut messages: Vec<BotMessage> = fetched
                .into_iter()
                .filter(|m| is_summarizable(m, trigger))
                .collect();
            let excess = messages.len().saturating_sub(n);
            messages.drain(..excess);
            return Ok(messages);
        };

        let mut collected: Vec<BotMessage> = Vec::new();
        let mut before: Option<String> = None;
        loop {
            let page = ctx
                .messenger()
                .fetch_messages(chat_id, PAGE_SIZE, before.as_deref())
                .await?;
            let Some(oldest) = page.first() else {
                break;
            };
            let reached_start = oldest.timestamp < start;
            let full_page = page.len() >= PAGE_SIZE;
            before = Some(oldest.id.clone());

            let mut in_window: Vec<BotMessage> = page
                .into_iter()
                .filter(|m| m.timestamp >= start && m.timestamp < end)
                .filter(|m| is_summarizable(m, trigger))
                .collect();
            in_window.append(&mut collected);
            collected = in_window;

            if reached_start || !full_page || collected.len() >= self.max_messages {
                break;
            }
        }

        let excess = collected.len().saturating_sub(self.max_messages);
        collected.drain(..excess);
        Ok(collected)
    }
}

fn is_summarizable(message: &BotMessage, trigger: &str) -> bool {
    message.id != trigger && !message.from_me && !message.text.trim().is_empty()
}

fn transcript(messages: &[BotMessage]) -> String {
    messages
        .iter()
        .map(|m| {
            let when = DateTime::from_timestamp(m.timestamp, 0)
                .map(|d| d.with_timezone(&Local).format("%d/%m %H:%M").to_string())
                .unwrap_or_default();
            format!("[{}] {}: {}", when, m.display_author(), m.text.trim())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl CommandHandler for ResumoHandler {
    fn command(&self) -> CommandName {
        CommandName::Resumo
    }

    #[instrument(skip(self, ctx), fields(chat = %ctx.chat_id(), input = %ctx.input))]
    async fn execute(&self, ctx: &CommandContext<'_>) -> AppResult<()> {
        let window = if ctx.input.trim().is_empty() {
            let size = self
                .settings
                .summary_size(ctx.chat_id())
                .await
                .unwrap_or(self.default_size);
            SummaryWindow::Count(size)
        } else {
            match SummaryWindow::parse(ctx.input) {
                Some(window) => window,
                None => return ctx.reply_error(ErrorKind::InvalidFormat).await,
            }
        };
        debug!("Summary window: {:?}", window);

        let history = self.collect(ctx, window).await?;
        if history.is_empty() {
            return ctx.reply_error(ErrorKind::NoMessages).await;
        }

        let request = format!(
            "Resuma {}:\n\n{}",
            window.describe(),
            transcript(&history)
        );
        let summary = self
            .llm
            .chat(
                vec![
                    Message::system(system_prompt_with_date(SUMMARY_PROMPT)),
                    Message::user(request),
                ],
                Some(0.3),
                None,
            )
            .await?;

        info!("Summarized {} messages", history.len());
        ctx.reply(&format!("📝 *Resumo*\n\n{}", summary.trim())).await?;
        Ok(())
    }
}
