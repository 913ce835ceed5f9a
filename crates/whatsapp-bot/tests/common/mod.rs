//! Shared setup: a mocked WhatsApp bridge, a mocked completion provider and
//! an application wired against both.

#![allow(dead_code)]

use llm_client::LlmClient;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use whatsapp_bot::{App, Config};
use whatsapp_client::{BotMessage, IncomingEvent, WhatsAppClient};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

pub const BOT_ID: &str = "5511900000000@c.us";
pub const ADMIN: &str = "5511911111111@c.us";
pub const USER: &str = "5511922222222@c.us";
pub const GROUP: &str = "120363041234@g.us";

pub struct Harness {
    pub bridge: MockServer,
    pub provider: MockServer,
    pub app: App,
}

impl Harness {
    /// Start both mock servers and build the app. `permissions` is TOML placed
    /// under `[permissions]`.
    pub async fn start(permissions: &str) -> Self {
        let bridge = MockServer::start().await;
        let provider = MockServer::start().await;

        let toml = format!(
            r#"
            [whatsapp]
            service_url = "{bridge}"
            bot_id = "{BOT_ID}"

            [llm]
            api_key = "sk-test"
            base_url = "{provider}"
            model = "test-model"
            timeout = "5s"

            [bot]
            nlp_timeout = "5s"

            [permissions]
            admin = "{ADMIN}"
            {permissions}
            "#,
            bridge = bridge.uri(),
            provider = provider.uri(),
        );
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(&toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        let whatsapp = WhatsAppClient::new(&config.whatsapp.service_url).unwrap();
        let llm = Arc::new(
            LlmClient::new(
                &config.llm.api_key,
                &config.llm.base_url,
                &config.llm.model,
                Duration::from_secs(5),
            )
            .unwrap(),
        );
        let bot_id = config.whatsapp.bot_id.clone().unwrap();
        let app = App::build(&config, Arc::new(whatsapp), llm, bot_id).unwrap();

        Self {
            bridge,
            provider,
            app,
        }
    }

    /// Accept every outgoing text message.
    pub async fn accept_sends(&self) {
        Mock::given(method("POST"))
            .and(path(format!("/v1/chats/{}/messages", encoded(GROUP))))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "sent-1" })))
            .mount(&self.bridge)
            .await;
    }

    /// Answer every chat completion with `content`.
    pub async fn model_says(&self, content: &str) {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": content } }]
            })))
            .mount(&self.provider)
            .await;
    }

    pub async fn bridge_requests(&self, verb: &str) -> Vec<Request> {
        self.bridge
            .received_requests()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.method.to_string() == verb)
            .collect()
    }

    pub async fn provider_requests(&self) -> Vec<Request> {
        self.provider.received_requests().await.unwrap()
    }
}

pub fn encoded(id: &str) -> String {
    id.replace('@', "%40")
}

pub fn body_json(request: &Request) -> Value {
    serde_json::from_slice(&request.body).unwrap()
}

pub fn body_text(request: &Request) -> String {
    String::from_utf8(request.body.clone()).unwrap()
}

/// A group message as delivered by the receive endpoint.
pub fn group_event(id: &str, author: &str, body: &str, mentioned: &[&str]) -> BotMessage {
    let event: IncomingEvent = serde_json::from_value(json!({
        "event": "message",
        "message": {
            "id": id,
            "from": GROUP,
            "author": author,
            "notifyName": "Ana",
            "body": body,
            "timestamp": chrono::Utc::now().timestamp(),
            "type": "chat",
            "fromMe": false,
            "hasMedia": false,
            "mentionedIds": mentioned,
            "chatName": "Amigos"
        }
    }))
    .unwrap();
    BotMessage::from_incoming(&event).unwrap()
}

/// History entry in the bridge's wire format.
pub fn wire_message(id: &str, author: &str, body: &str, timestamp: i64) -> Value {
    json!({
        "id": id,
        "from": GROUP,
        "author": author,
        "notifyName": author.split('@').next().unwrap_or_default(),
        "body": body,
        "timestamp": timestamp,
        "type": "chat",
    })
}
