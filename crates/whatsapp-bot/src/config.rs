//! Application configuration loaded from an optional file and environment variables.

use crate::catalog::{AutoDeletePolicy, CommandName, CommandRegistry};
use crate::permissions::PermissionsConfig;
use crate::tags::TagsConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// WhatsApp bridge configuration
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,

    /// Completion provider configuration
    pub llm: LlmConfig,

    /// Bot behavior
    #[serde(default)]
    pub bot: BotConfig,

    /// Who may run which command where
    #[serde(default)]
    pub permissions: PermissionsConfig,

    /// Mention tags
    #[serde(default)]
    pub tags: TagsConfig,

    /// Per-command overrides, keyed by command name
    #[serde(default)]
    pub commands: HashMap<String, CommandOverride>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppConfig {
    /// WhatsApp REST bridge endpoint
    #[serde(default = "default_whatsapp_service")]
    pub service_url: String,

    /// Poll interval for messages
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// The bot's own id; asked from the bridge when absent
    #[serde(default)]
    pub bot_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Provider API key
    pub api_key: String,

    /// API base URL
    #[serde(default = "default_llm_url")]
    pub base_url: String,

    /// Default chat model
    #[serde(default = "default_model")]
    pub model: String,

    /// Model with web search, used for news; falls back to `model`
    #[serde(default)]
    pub search_model: Option<String>,

    #[serde(default = "default_image_model")]
    pub image_model: String,

    #[serde(default = "default_image_size")]
    pub image_size: String,

    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,

    /// Request timeout
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// System prompt for free-form questions
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Upper bound for one natural-language interpretation call
    #[serde(default = "default_nlp_timeout", with = "humantime_serde")]
    pub nlp_timeout: Duration,

    /// How often the auto-delete queue is swept
    #[serde(default = "default_sweep_interval", with = "humantime_serde")]
    pub sweep_interval: Duration,

    /// How many recent messages are searched when deleting
    #[serde(default = "default_deletion_lookback")]
    pub deletion_lookback: usize,

    /// Messages summarized by a bare `#resumo`
    #[serde(default = "default_summary_size")]
    pub default_summary_size: usize,

    /// Hard cap on messages fetched for one summary
    #[serde(default = "default_max_summary_messages")]
    pub max_summary_messages: usize,

    /// How long news answers are reused
    #[serde(default = "default_news_cache_ttl", with = "humantime_serde")]
    pub news_cache_ttl: Duration,

    /// Abandoned wizards are released after this long
    #[serde(default = "default_wizard_ttl", with = "humantime_serde")]
    pub wizard_ttl: Duration,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Overrides applied on top of the built-in command table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandOverride {
    #[serde(default)]
    pub sticker_hash: Option<String>,
    #[serde(default)]
    pub auto_delete: Option<AutoDeletePolicy>,
}

// Default implementations
impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            service_url: default_whatsapp_service(),
            poll_interval: default_poll_interval(),
            bot_id: None,
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            nlp_timeout: default_nlp_timeout(),
            sweep_interval: default_sweep_interval(),
            deletion_lookback: default_deletion_lookback(),
            default_summary_size: default_summary_size(),
            max_summary_messages: default_max_summary_messages(),
            news_cache_ttl: default_news_cache_ttl(),
            wizard_ttl: default_wizard_ttl(),
            log_level: default_log_level(),
        }
    }
}

// Default value functions
fn default_whatsapp_service() -> String {
    "http://whatsapp-bridge:3000".into()
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_llm_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

fn default_image_model() -> String {
    "dall-e-3".into()
}

fn default_image_size() -> String {
    "1024x1024".into()
}

fn default_transcription_model() -> String {
    "whisper-1".into()
}

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_nlp_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_deletion_lookback() -> usize {
    50
}

fn default_summary_size() -> usize {
    30
}

fn default_max_summary_messages() -> usize {
    500
}

fn default_news_cache_ttl() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_wizard_ttl() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_system_prompt() -> String {
    r#"Você é um assistente num grupo de WhatsApp.

- Responda em português, de forma curta: isto é chat de celular, não redação
- Use formatação do WhatsApp (*negrito*, _itálico_) com moderação
- Se a pergunta vier com uma mensagem citada, use-a como contexto
- Não invente fatos, datas ou números; diga quando não souber"#
        .into()
}

/// Append the current date to a system prompt.
pub fn system_prompt_with_date(base_prompt: &str) -> String {
    let now = chrono::Local::now();
    format!(
        "{}\n\nData e hora atuais: {}",
        base_prompt,
        now.format("%d/%m/%Y %H:%M")
    )
}

fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load configuration from `BOT_CONFIG` (default `bot.toml`, optional)
    /// and environment variables, the latter taking precedence.
    pub fn load() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let file = std::env::var("BOT_CONFIG").unwrap_or_else(|_| "bot.toml".into());

        let config = config::Config::builder()
            .add_source(config::File::with_name(&file).required(false))
            .add_source(
                config::Environment::default()
                    .separator("__")
                    // Phone numbers must stay strings.
                    .try_parsing(false),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Apply `[commands.*]` overrides to the command table.
    pub fn apply_overrides(&self, registry: &mut CommandRegistry) {
        for (key, over) in &self.commands {
            let Some(name) = CommandName::parse(key) else {
                warn!("Ignoring overrides for unknown command {}", key);
                continue;
            };
            registry.configure(name, |spec| {
                if let Some(hash) = &over.sticker_hash {
                    spec.sticker_hash = Some(hash.to_lowercase());
                }
                if let Some(policy) = over.auto_delete {
                    spec.auto_delete = policy;
                }
            });
        }
    }
}
