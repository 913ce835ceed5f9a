//! Builds the command table, the handlers and the message pipeline from
//! configuration.

use crate::autodelete::AutoDeleteQueue;
use crate::catalog::{CommandName, CommandRegistry};
use crate::commands::*;
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::error::AppResult;
use crate::intent::IntentParser;
use crate::nlp::NlpFallback;
use crate::permissions::PermissionGate;
use crate::router::Router;
use crate::tags::TagBook;
use crate::wizard::{ChatSettings, ConfigWizard, InMemoryWizardStore};
use llm_client::LlmClient;
use std::sync::Arc;
use tracing::info;
use whatsapp_client::Messenger;

pub struct App {
    pub router: Arc<Router>,
    pub queue: Arc<AutoDeleteQueue>,
    pub wizards: Arc<InMemoryWizardStore>,
}

impl App {
    pub fn build(
        config: &Config,
        messenger: Arc<dyn Messenger>,
        llm: Arc<LlmClient>,
        bot_id: impl Into<String>,
    ) -> AppResult<Self> {
        let bot_id = bot_id.into();

        let mut registry = CommandRegistry::builtin()?;
        config.apply_overrides(&mut registry);
        let registry = Arc::new(registry);

        let tags = Arc::new(TagBook::from_config(&config.tags));
        let gate = Arc::new(PermissionGate::new(&config.permissions, messenger.clone()));
        let parser = Arc::new(IntentParser::new(registry.clone(), tags.clone(), bot_id.clone())?);

        let wizards = Arc::new(InMemoryWizardStore::new(config.bot.wizard_ttl));
        let queue = Arc::new(AutoDeleteQueue::new(
            messenger.clone(),
            config.bot.deletion_lookback,
        ));
        let settings = Arc::new(ChatSettings::new());
        let news_cache = Arc::new(NewsCache::new(config.bot.news_cache_ttl));

        let wizard_policy = registry
            .get(CommandName::Configurar)
            .map(|spec| spec.auto_delete)
            .unwrap_or_default();
        let config_wizard = Arc::new(ConfigWizard::new(
            wizards.clone(),
            settings.clone(),
            messenger.clone(),
            queue.clone(),
            wizard_policy,
            config.bot.max_summary_messages,
        ));

        let search_model = config
            .llm
            .search_model
            .clone()
            .unwrap_or_else(|| config.llm.model.clone());

        let mut handlers = HandlerRegistry::new();
        handlers
            .register(Arc::new(ResumoHandler::new(
                llm.clone(),
                settings,
                config.bot.default_summary_size,
                config.bot.max_summary_messages,
            )))
            .register(Arc::new(ChatHandler::new(
                llm.clone(),
                config.bot.system_prompt.clone(),
            )))
            .register(Arc::new(TagHandler::new(tags.clone(), bot_id.clone())))
            .register(Arc::new(NewsHandler::new(
                llm.clone(),
                news_cache.clone(),
                search_model,
            )))
            .register(Arc::new(ImageHandler::new(
                llm.clone(),
                config.llm.image_model.clone(),
                config.llm.image_size.clone(),
            )))
            .register(Arc::new(AudioHandler::new(
                llm.clone(),
                config.llm.transcription_model.clone(),
            )))
            .register(Arc::new(HelpHandler::new(
                registry.clone(),
                tags.clone(),
                gate.clone(),
            )))
            .register(Arc::new(CacheClearHandler::new(news_cache)))
            .register(Arc::new(ConfigureHandler::new(config_wizard.clone())));
        info!("Registered {} command handlers", handlers.len());

        let dispatcher = Arc::new(Dispatcher::new(
            parser.clone(),
            registry.clone(),
            Arc::new(handlers),
            gate.clone(),
            wizards.clone(),
            queue.clone(),
            messenger.clone(),
        ));
        let nlp = Arc::new(NlpFallback::new(
            llm,
            registry.clone(),
            tags,
            gate,
            wizards.clone(),
            config.bot.nlp_timeout,
        ));
        let router = Arc::new(Router::new(
            parser,
            registry,
            dispatcher,
            nlp,
            config_wizard,
            wizards.clone(),
            messenger,
        ));

        Ok(Self {
            router,
            queue,
            wizards,
        })
    }
}
