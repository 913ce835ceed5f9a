//! Natural-language fallback: asks the completion provider to map a request
//! onto one command line.

use crate::catalog::{CommandName, CommandRegistry, COMMAND_MARKER};
use crate::error::NlpError;
use crate::intent::{AttachmentHint, ParsedIntent};
use crate::permissions::PermissionGate;
use crate::tags::TagBook;
use crate::wizard::{WizardKey, WizardState, WizardStateStore};
use llm_client::{LlmClient, Message};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use whatsapp_client::{user_part, BotMessage};

/// Requests for the command list, answered without a provider call.
const HELP_PHRASES: &[&str] = &[
    "o que você faz",
    "o que voce faz",
    "o que você sabe fazer",
    "o que voce sabe fazer",
    "o que você pode fazer",
    "o que voce pode fazer",
    "quais comandos",
    "quais são os comandos",
    "quais sao os comandos",
    "lista de comandos",
    "seus comandos",
    "mostra os comandos",
    "mostre os comandos",
    "como te usar",
    "como usar o bot",
];

const QUOTE_FLAG: &str = "--quote=";
const MEDIA_FLAG: &str = "--media=";

pub fn is_help_request(text: &str) -> bool {
    let text = text.to_lowercase();
    HELP_PHRASES.iter().any(|phrase| text.contains(phrase))
}

/// Capability tags derived from a command description.
pub fn capabilities(description: &str) -> Vec<&'static str> {
    let description = description.to_lowercase();
    let mut caps = Vec::new();
    if description.contains("citad") {
        caps.push("quote");
    }
    if ["imagem", "áudio", "audio", "mídia", "voz"]
        .iter()
        .any(|k| description.contains(k))
    {
        caps.push("media");
    }
    if description.contains("link") {
        caps.push("link");
    }
    caps
}

pub struct NlpFallback {
    llm: Arc<LlmClient>,
    registry: Arc<CommandRegistry>,
    tags: Arc<TagBook>,
    gate: Arc<PermissionGate>,
    wizard: Arc<dyn WizardStateStore>,
    timeout: Duration,
}

impl NlpFallback {
    pub fn new(
        llm: Arc<LlmClient>,
        registry: Arc<CommandRegistry>,
        tags: Arc<TagBook>,
        gate: Arc<PermissionGate>,
        wizard: Arc<dyn WizardStateStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            llm,
            registry,
            tags,
            gate,
            wizard,
            timeout,
        }
    }

    /// Whether a message unresolved by literal parsing may be interpreted.
    pub async fn is_eligible(&self, message: &BotMessage, bot_id: &str) -> bool {
        if message.from_me || message.author == bot_id {
            return false;
        }
        if message.text.trim().is_empty() {
            return false;
        }
        if message.is_group {
            let handle = format!("@{}", user_part(bot_id));
            if !message.mentions(bot_id) && !message.text.contains(&handle) {
                return false;
            }
        } else if self.gate.is_admin(&message.author) {
            return true;
        }

        self.gate
            .nlp_allowed(&message.chat_id, &message.author)
            .await
    }

    /// Map `text` (bot mention already removed) to an intent.
    #[instrument(skip_all, fields(chat = %message.chat_id))]
    pub async fn interpret(
        &self,
        text: &str,
        message: &BotMessage,
    ) -> Result<Option<ParsedIntent>, NlpError> {
        if is_help_request(text) {
            debug!("Help phrase, skipping provider");
            return Ok(Some(ParsedIntent::new(CommandName::CommandList, "")));
        }

        let prompt = self.build_prompt(text, message);
        let reply = tokio::time::timeout(
            self.timeout,
            self.llm.chat(vec![Message::system(prompt)], Some(0.0), Some(120)),
        )
        .await
        .map_err(|_| NlpError::Timeout(self.timeout))??;

        let Some(intent) = self.parse_reply(&reply, message) else {
            info!("No command in interpretation: {}", reply.trim());
            return Ok(None);
        };
        info!("Interpreted as {} {:?}", intent.command, intent.input);

        if self
            .registry
            .get(intent.command)
            .is_some_and(|spec| spec.wizard)
        {
            let decision = self
                .gate
                .is_allowed(intent.command, &message.chat_id, &message.author)
                .await;
            if decision.allowed {
                self.wizard
                    .set(
                        WizardKey::for_message(message),
                        WizardState {
                            command: intent.command,
                        },
                    )
                    .await;
            }
        }

        Ok(Some(intent))
    }

    fn catalog(&self) -> String {
        self.registry
            .specs()
            .filter(|spec| !spec.description.is_empty())
            .map(|spec| {
                let (alias, triggers) = if spec.prefixes.is_empty() {
                    ("@tag".to_string(), "menção de tag".to_string())
                } else {
                    (
                        format!("{}{}", COMMAND_MARKER, spec.primary_alias()),
                        spec.prefixes.join(", "),
                    )
                };
                format!(
                    "- {} ({}) [{}]: {}",
                    alias,
                    triggers,
                    capabilities(&spec.description).join(", "),
                    spec.description
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn context(&self, text: &str, message: &BotMessage) -> serde_json::Value {
        json!({
            "text": text,
            "quoted": message.quoted.as_ref().map(|q| json!({
                "id": q.id,
                "text": q.body,
                "mediaType": q.has_media.then(|| q.message_type.as_str()),
            })),
            "media": message.has_media.then(|| json!({
                "id": message.id,
                "type": message.message_type.as_str(),
            })),
        })
    }

    fn build_prompt(&self, text: &str, message: &BotMessage) -> String {
        let tags = self.tags.tags_for(message.chat_name.as_deref()).join(", ");
        format!(
            "Você traduz pedidos feitos a um bot de WhatsApp em um comando.\n\n\
             Comandos:\n{}\n\n\
             Tags de menção deste chat: {}\n\n\
             Mensagem (JSON):\n{}\n\n\
             Responda com exatamente UMA linha, em um destes formatos:\n\
             #comando entrada\n\
             #comando {}<id da mensagem citada>\n\
             #comando {}<id da mídia>\n\
             @tag\n\
             Se nenhum comando servir, responda: nenhum",
            self.catalog(),
            tags,
            self.context(text, message),
            QUOTE_FLAG,
            MEDIA_FLAG,
        )
    }

    /// Parse the model's line through the shared alias table.
    fn parse_reply(&self, reply: &str, message: &BotMessage) -> Option<ParsedIntent> {
        let line = reply
            .lines()
            .map(|l| l.trim().trim_matches('`').trim())
            .find(|l| !l.is_empty())?;

        if let Some(rest) = line.strip_prefix(COMMAND_MARKER) {
            let (token, input) = rest
                .split_once(char::is_whitespace)
                .unwrap_or((rest, ""));
            let command = self.registry.resolve_alias(token)?;

            let mut intent = ParsedIntent::new(command, "");
            let mut words = Vec::new();
            for word in input.split_whitespace() {
                if let Some(id) = word.strip_prefix(QUOTE_FLAG) {
                    intent.hint = validate_hint(AttachmentHint::Quote(id.to_string()), message);
                } else if let Some(id) = word.strip_prefix(MEDIA_FLAG) {
                    intent.hint = validate_hint(AttachmentHint::Media(id.to_string()), message);
                } else {
                    words.push(word);
                }
            }
            intent.input = words.join(" ");
            return Some(intent);
        }

        if line.starts_with('@') {
            let token = line.split_whitespace().next()?;
            return Some(ParsedIntent::new(CommandName::Tag, token));
        }

        None
    }
}

/// Keep hints that point at the quoted message or the message itself.
fn validate_hint(hint: AttachmentHint, message: &BotMessage) -> Option<AttachmentHint> {
    let id = hint.message_id();
    let known = message.quoted.as_ref().is_some_and(|q| q.id == id) || message.id == id;
    if !known {
        warn!("Ignoring hint to unknown message {}", id);
    }
    known.then_some(hint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::{AllowList, PermissionsConfig};
    use crate::tags::TagsConfig;
    use crate::testing::{direct_message, group_message, RecordingMessenger, ADMIN, BOT_ID, GROUP, USER};
    use crate::wizard::InMemoryWizardStore;
    use tokio_test::{assert_err, assert_ok};
    use whatsapp_client::{MessageType, QuotedMessage};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        server: MockServer,
        wizard: Arc<InMemoryWizardStore>,
        nlp: NlpFallback,
    }

    async fn fixture() -> Fixture {
        let server = MockServer::start().await;
        let llm = Arc::new(LlmClient::new("k", server.uri(), "m", Duration::from_secs(5)).unwrap());
        let config = PermissionsConfig {
            admin: Some(ADMIN.to_string()),
            nlp: AllowList::Only(vec![GROUP.to_string()]),
            ..Default::default()
        };
        let gate = Arc::new(PermissionGate::new(&config, Arc::new(RecordingMessenger::new())));
        let wizard = Arc::new(InMemoryWizardStore::new(Duration::from_secs(60)));
        let nlp = NlpFallback::new(
            llm,
            Arc::new(CommandRegistry::builtin().unwrap()),
            Arc::new(TagBook::from_config(&TagsConfig::default())),
            gate,
            wizard.clone(),
            Duration::from_secs(2),
        );
        Fixture { server, wizard, nlp }
    }

    async fn reply_with(server: &MockServer, content: &str) {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": content } }]
            })))
            .mount(server)
            .await;
    }

    fn mentioning(text: &str) -> BotMessage {
        let mut msg = group_message("m1", USER, text);
        msg.mentioned_ids = vec![BOT_ID.to_string()];
        msg
    }

    #[test]
    fn test_capabilities() {
        assert_eq!(capabilities("Usa a mensagem citada"), vec!["quote"]);
        assert_eq!(capabilities("Transcreve um áudio"), vec!["media"]);
        assert_eq!(capabilities("Resume o link enviado"), vec!["link"]);
        assert!(capabilities("Mostra a lista").is_empty());
    }

    #[test]
    fn test_help_phrases() {
        assert!(is_help_request("Bot, o que você faz?"));
        assert!(is_help_request("QUAIS COMANDOS existem"));
        assert!(!is_help_request("resuma a conversa"));
    }

    #[tokio::test]
    async fn test_eligibility() {
        let f = fixture().await;

        assert!(f.nlp.is_eligible(&mentioning("oi @5511900000000"), BOT_ID).await);
        assert!(!f.nlp.is_eligible(&group_message("m1", USER, "oi"), BOT_ID).await);
        assert!(f.nlp.is_eligible(&direct_message("m1", ADMIN, "resuma"), BOT_ID).await);
        assert!(!f.nlp.is_eligible(&direct_message("m1", USER, "resuma"), BOT_ID).await);

        let mut own = mentioning("oi");
        own.from_me = true;
        assert!(!f.nlp.is_eligible(&own, BOT_ID).await);

        let mut media_only = mentioning("");
        media_only.has_media = true;
        assert!(!f.nlp.is_eligible(&media_only, BOT_ID).await);

        let mut elsewhere = mentioning("oi");
        elsewhere.chat_id = "1@g.us".into();
        assert!(!f.nlp.is_eligible(&elsewhere, BOT_ID).await);
    }

    #[tokio::test]
    async fn test_help_phrase_skips_provider() {
        let f = fixture().await;
        let intent = f
            .nlp
            .interpret("o que você faz?", &mentioning("o que você faz?"))
            .await
            .unwrap();
        assert_eq!(intent, Some(ParsedIntent::new(CommandName::CommandList, "")));
        assert!(f.server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tag_reply() {
        let f = fixture().await;
        reply_with(&f.server, "@admin").await;

        let intent = f
            .nlp
            .interpret("marque todos os admins", &mentioning("marque todos os admins"))
            .await
            .unwrap();
        assert_eq!(intent, Some(ParsedIntent::new(CommandName::Tag, "@admin")));

        let body = String::from_utf8(f.server.received_requests().await.unwrap()[0].body.clone())
            .unwrap();
        assert!(body.contains("#resumo"));
        assert!(body.contains("marque todos os admins"));
        assert!(body.contains("@admin"));
    }

    #[tokio::test]
    async fn test_alias_reply_with_input() {
        let f = fixture().await;
        reply_with(&f.server, "`#resumo 20`\n").await;

        let intent = f.nlp.interpret("resume aí", &mentioning("resume aí")).await.unwrap();
        assert_eq!(intent, Some(ParsedIntent::new(CommandName::Resumo, "20")));
    }

    #[tokio::test]
    async fn test_quote_hint_is_validated() {
        let f = fixture().await;
        reply_with(&f.server, "#audio --quote=voice-1").await;

        let mut message = mentioning("transcreve isso");
        message.quoted = Some(QuotedMessage {
            id: "voice-1".into(),
            body: String::new(),
            message_type: MessageType::Ptt,
            has_media: true,
        });
        let intent = f.nlp.interpret("transcreve isso", &message).await.unwrap().unwrap();
        assert_eq!(intent.command, CommandName::Audio);
        assert_eq!(intent.hint, Some(AttachmentHint::Quote("voice-1".into())));
        assert_eq!(intent.input, "");

        let unquoted = mentioning("transcreve isso");
        let intent = f.nlp.interpret("transcreve isso", &unquoted).await.unwrap().unwrap();
        assert_eq!(intent.hint, None);
    }

    #[tokio::test]
    async fn test_unrecognized_reply_is_none() {
        let f = fixture().await;
        reply_with(&f.server, "nenhum").await;
        let intent = assert_ok!(f.nlp.interpret("bom dia", &mentioning("bom dia")).await);
        assert_eq!(intent, None);
    }

    #[tokio::test]
    async fn test_unknown_alias_is_none() {
        let f = fixture().await;
        reply_with(&f.server, "#dancar agora").await;
        let intent = f.nlp.interpret("dança", &mentioning("dança")).await.unwrap();
        assert_eq!(intent, None);
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        let f = fixture().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&f.server)
            .await;

        let result = f.nlp.interpret("resuma", &mentioning("resuma")).await;
        let err = assert_err!(result);
        assert!(matches!(err, NlpError::Completion(_)));
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let f = fixture().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(4))
                    .set_body_json(serde_json::json!({ "choices": [] })),
            )
            .mount(&f.server)
            .await;

        let result = f.nlp.interpret("resuma", &mentioning("resuma")).await;
        assert!(matches!(result, Err(NlpError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_wizard_marked_only_when_allowed() {
        let f = fixture().await;
        reply_with(&f.server, "#configurar").await;

        let user = mentioning("quero configurar");
        f.nlp.interpret("quero configurar", &user).await.unwrap();
        assert!(!f.wizard.is_active(&WizardKey::for_message(&user)).await);

        let admin = direct_message("m2", ADMIN, "quero configurar");
        let intent = f.nlp.interpret("quero configurar", &admin).await.unwrap();
        assert_eq!(intent.unwrap().command, CommandName::Configurar);
        assert!(f.wizard.is_active(&WizardKey::for_message(&admin)).await);
    }
}
