//! Per-message pipeline: wizard, sticker trigger, literal parsing, then the
//! natural-language fallback.

use crate::catalog::CommandRegistry;
use crate::dispatcher::Dispatcher;
use crate::intent::{IntentParser, ParsedIntent, Resolution};
use crate::nlp::NlpFallback;
use crate::wizard::{ConfigWizard, WizardKey, WizardStateStore};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use whatsapp_client::{BotMessage, MessageType, Messenger};

/// What happened to an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Own message or nothing addressed to the bot.
    Ignored,
    /// Consumed by the configuration wizard.
    Wizard,
    /// Reached the dispatcher; `true` when the handler completed.
    Dispatched(bool),
    /// `@word` that is not a tag.
    Rejected,
    /// The language model found no command.
    Unresolved,
}

pub struct Router {
    parser: Arc<IntentParser>,
    registry: Arc<CommandRegistry>,
    dispatcher: Arc<Dispatcher>,
    nlp: Arc<NlpFallback>,
    wizard: Arc<ConfigWizard>,
    wizard_store: Arc<dyn WizardStateStore>,
    messenger: Arc<dyn Messenger>,
}

impl Router {
    pub fn new(
        parser: Arc<IntentParser>,
        registry: Arc<CommandRegistry>,
        dispatcher: Arc<Dispatcher>,
        nlp: Arc<NlpFallback>,
        wizard: Arc<ConfigWizard>,
        wizard_store: Arc<dyn WizardStateStore>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            parser,
            registry,
            dispatcher,
            nlp,
            wizard,
            wizard_store,
            messenger,
        }
    }

    #[instrument(skip_all, fields(msg = %message.id))]
    pub async fn handle(&self, message: &BotMessage) -> Outcome {
        if message.from_me {
            return Outcome::Ignored;
        }

        match self.wizard.handle(message).await {
            Ok(true) => return Outcome::Wizard,
            Ok(false) => {}
            Err(e) => {
                error!("Wizard failed: {}", e);
                return Outcome::Wizard;
            }
        }

        if message.message_type == MessageType::Sticker && message.has_media {
            if let Some(intent) = self.sticker_intent(message).await {
                return Outcome::Dispatched(self.dispatcher.dispatch(message, Some(intent)).await);
            }
        }

        let text = match self.parser.parse(message) {
            Resolution::Command(intent) => {
                return Outcome::Dispatched(self.dispatcher.dispatch(message, Some(intent)).await);
            }
            Resolution::Rejected => {
                debug!("Unknown tag, ignoring");
                return Outcome::Rejected;
            }
            Resolution::Natural(text) => text,
            Resolution::NoMatch => self.parser.strip_bot_mention(&message.text),
        };

        if !self.nlp.is_eligible(message, self.parser.bot_id()).await {
            return Outcome::Ignored;
        }

        let intent = match self.nlp.interpret(&text, message).await {
            Ok(Some(intent)) => intent,
            Ok(None) => return Outcome::Unresolved,
            Err(e) => {
                warn!("Interpretation failed: {}", e);
                return Outcome::Unresolved;
            }
        };

        let wants_wizard = self
            .registry
            .get(intent.command)
            .is_some_and(|spec| spec.wizard);
        if wants_wizard
            && self
                .wizard_store
                .is_active(&WizardKey::for_message(message))
                .await
        {
            if let Err(e) = self.wizard.begin(message).await {
                error!("Could not start wizard: {}", e);
            }
            return Outcome::Wizard;
        }

        Outcome::Dispatched(self.dispatcher.dispatch(message, Some(intent)).await)
    }

    async fn sticker_intent(&self, message: &BotMessage) -> Option<ParsedIntent> {
        let media = match self.messenger.download_media(&message.id).await {
            Ok(media) => media,
            Err(e) => {
                warn!("Could not download sticker: {}", e);
                return None;
            }
        };
        let bytes = match media.bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Sticker payload is not base64: {}", e);
                return None;
            }
        };

        let hash = hex::encode(Sha256::digest(&bytes));
        let spec = self.registry.by_sticker_hash(&hash)?;
        info!("Sticker triggers {}", spec.name);
        Some(ParsedIntent::new(spec.name, ""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodelete::AutoDeleteQueue;
    use crate::catalog::{AutoDeletePolicy, CommandName};
    use crate::commands::{CommandContext, CommandHandler, HandlerRegistry};
    use crate::error::AppResult;
    use crate::permissions::{AllowList, PermissionGate, PermissionsConfig};
    use crate::tags::{TagBook, TagsConfig};
    use crate::testing::{direct_message, group_message, RecordingMessenger, ADMIN, BOT_ID, GROUP, USER};
    use crate::wizard::{ChatSettings, InMemoryWizardStore};
    use async_trait::async_trait;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use llm_client::LlmClient;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use whatsapp_client::MediaPayload;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const STICKER: &[u8] = b"sticker-bytes";

    struct Recorder {
        command: CommandName,
        seen: Arc<Mutex<Vec<(CommandName, String)>>>,
    }

    #[async_trait]
    impl CommandHandler for Recorder {
        fn command(&self) -> CommandName {
            self.command
        }

        async fn execute(&self, ctx: &CommandContext<'_>) -> AppResult<()> {
            self.seen
                .lock()
                .unwrap()
                .push((ctx.spec.name, ctx.input.to_string()));
            Ok(())
        }
    }

    struct Fixture {
        server: MockServer,
        messenger: Arc<RecordingMessenger>,
        store: Arc<InMemoryWizardStore>,
        seen: Arc<Mutex<Vec<(CommandName, String)>>>,
        router: Router,
    }

    async fn fixture() -> Fixture {
        let server = MockServer::start().await;
        let messenger = Arc::new(RecordingMessenger::new());

        let mut registry = CommandRegistry::builtin().unwrap();
        let hash = hex::encode(Sha256::digest(STICKER));
        registry.configure(CommandName::Resumo, |spec| spec.sticker_hash = Some(hash));
        let registry = Arc::new(registry);
        let tags = Arc::new(TagBook::from_config(&TagsConfig::default()));

        let mut allow = HashMap::new();
        for name in CommandName::ALL {
            allow.insert(name.as_str().to_string(), AllowList::Only(vec![GROUP.to_string()]));
        }
        let config = PermissionsConfig {
            admin: Some(ADMIN.to_string()),
            allow,
            nlp: AllowList::Only(vec![GROUP.to_string()]),
            ..Default::default()
        };
        let gate = Arc::new(PermissionGate::new(&config, messenger.clone()));

        let store = Arc::new(InMemoryWizardStore::new(Duration::from_secs(60)));
        let queue = Arc::new(AutoDeleteQueue::new(messenger.clone(), 10));
        let wizard = Arc::new(ConfigWizard::new(
            store.clone(),
            Arc::new(ChatSettings::new()),
            messenger.clone(),
            queue.clone(),
            AutoDeletePolicy::default(),
            100,
        ));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut handlers = HandlerRegistry::new();
        for name in CommandName::ALL {
            handlers.register(Arc::new(Recorder {
                command: name,
                seen: seen.clone(),
            }));
        }

        let parser = Arc::new(IntentParser::new(registry.clone(), tags.clone(), BOT_ID).unwrap());
        let dispatcher = Arc::new(Dispatcher::new(
            parser.clone(),
            registry.clone(),
            Arc::new(handlers),
            gate.clone(),
            store.clone(),
            queue,
            messenger.clone(),
        ));
        let llm = Arc::new(LlmClient::new("k", server.uri(), "m", Duration::from_secs(5)).unwrap());
        let nlp = Arc::new(NlpFallback::new(
            llm,
            registry.clone(),
            tags,
            gate,
            store.clone(),
            Duration::from_secs(2),
        ));

        let router = Router::new(
            parser,
            registry,
            dispatcher,
            nlp,
            wizard,
            store.clone(),
            messenger.clone(),
        );
        Fixture {
            server,
            messenger,
            store,
            seen,
            router,
        }
    }

    async fn model_says(server: &MockServer, content: &str) {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": content } }]
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_literal_command_dispatches() {
        let f = fixture().await;
        let outcome = f.router.handle(&group_message("m1", USER, "#resumo 5")).await;
        assert_eq!(outcome, Outcome::Dispatched(true));
        assert_eq!(*f.seen.lock().unwrap(), vec![(CommandName::Resumo, "5".to_string())]);
    }

    #[tokio::test]
    async fn test_own_messages_ignored() {
        let f = fixture().await;
        let mut msg = group_message("m1", BOT_ID, "#resumo 5");
        msg.from_me = true;
        assert_eq!(f.router.handle(&msg).await, Outcome::Ignored);
        assert!(f.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_tag_rejected_without_model() {
        let f = fixture().await;
        let outcome = f.router.handle(&group_message("m1", USER, "@fulano oi")).await;
        assert_eq!(outcome, Outcome::Rejected);
        assert!(f.server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_plain_chatter_ignored() {
        let f = fixture().await;
        let outcome = f.router.handle(&group_message("m1", USER, "bom dia")).await;
        assert_eq!(outcome, Outcome::Ignored);
        assert!(f.server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mention_goes_through_model() {
        let f = fixture().await;
        model_says(&f.server, "@admin").await;

        let mut msg = group_message("m1", USER, "@5511900000000 chama os admins");
        msg.mentioned_ids = vec![BOT_ID.to_string()];
        assert_eq!(f.router.handle(&msg).await, Outcome::Dispatched(true));
        assert_eq!(*f.seen.lock().unwrap(), vec![(CommandName::Tag, "@admin".to_string())]);

        let body = String::from_utf8(f.server.received_requests().await.unwrap()[0].body.clone())
            .unwrap();
        assert!(body.contains("chama os admins"));
        assert!(!body.contains("@5511900000000 chama"));
    }

    #[tokio::test]
    async fn test_model_without_command_is_unresolved() {
        let f = fixture().await;
        model_says(&f.server, "nenhum").await;

        let mut msg = group_message("m1", USER, "@5511900000000 tudo bem?");
        msg.mentioned_ids = vec![BOT_ID.to_string()];
        assert_eq!(f.router.handle(&msg).await, Outcome::Unresolved);
        assert!(f.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sticker_triggers_command() {
        let f = fixture().await;
        f.messenger.add_media(
            "s1",
            MediaPayload {
                mimetype: "image/webp".into(),
                data: STANDARD.encode(STICKER),
                filename: None,
            },
        );

        let mut msg = group_message("s1", USER, "");
        msg.message_type = MessageType::Sticker;
        msg.has_media = true;
        assert_eq!(f.router.handle(&msg).await, Outcome::Dispatched(true));
        assert_eq!(*f.seen.lock().unwrap(), vec![(CommandName::Resumo, String::new())]);
    }

    #[tokio::test]
    async fn test_unknown_sticker_ignored() {
        let f = fixture().await;
        f.messenger.add_media(
            "s1",
            MediaPayload {
                mimetype: "image/webp".into(),
                data: STANDARD.encode(b"other"),
                filename: None,
            },
        );

        let mut msg = group_message("s1", USER, "");
        msg.message_type = MessageType::Sticker;
        msg.has_media = true;
        assert_eq!(f.router.handle(&msg).await, Outcome::Ignored);
    }

    #[tokio::test]
    async fn test_wizard_owns_conversation() {
        let f = fixture().await;
        model_says(&f.server, "#configurar").await;

        let start = direct_message("m1", ADMIN, "quero mudar as configurações");
        assert_eq!(f.router.handle(&start).await, Outcome::Wizard);
        assert!(f.store.is_active(&WizardKey::for_message(&start)).await);

        let answer = direct_message("m2", ADMIN, "#resumo 30");
        assert_eq!(f.router.handle(&answer).await, Outcome::Wizard);
        assert!(f.seen.lock().unwrap().is_empty());

        let done = direct_message("m3", ADMIN, "30");
        assert_eq!(f.router.handle(&done).await, Outcome::Wizard);
        assert!(!f.store.is_active(&WizardKey::for_message(&done)).await);
        assert!(f.messenger.sent_texts().last().unwrap().contains("30"));
    }
}
