//! Permission check, handler lookup and error containment for one command.

use crate::autodelete::{AutoDeleteQueue, MessageRef};
use crate::catalog::{CommandRegistry, CommandSpec, ErrorKind};
use crate::commands::{CommandContext, HandlerRegistry};
use crate::intent::{IntentParser, ParsedIntent, Resolution};
use crate::permissions::PermissionGate;
use crate::wizard::{WizardKey, WizardStateStore};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use whatsapp_client::{BotMessage, Messenger, OutgoingText};

pub struct Dispatcher {
    parser: Arc<IntentParser>,
    registry: Arc<CommandRegistry>,
    handlers: Arc<HandlerRegistry>,
    gate: Arc<PermissionGate>,
    wizard: Arc<dyn WizardStateStore>,
    queue: Arc<AutoDeleteQueue>,
    messenger: Arc<dyn Messenger>,
}

impl Dispatcher {
    pub fn new(
        parser: Arc<IntentParser>,
        registry: Arc<CommandRegistry>,
        handlers: Arc<HandlerRegistry>,
        gate: Arc<PermissionGate>,
        wizard: Arc<dyn WizardStateStore>,
        queue: Arc<AutoDeleteQueue>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            parser,
            registry,
            handlers,
            gate,
            wizard,
            queue,
            messenger,
        }
    }

    /// Run the command for `message`. `intent` skips re-parsing when the
    /// caller already resolved one. Returns whether a handler completed.
    #[instrument(skip_all, fields(chat = %message.chat_id, user = %message.author))]
    pub async fn dispatch(&self, message: &BotMessage, intent: Option<ParsedIntent>) -> bool {
        let intent = match intent {
            Some(intent) => intent,
            None => match self.parser.parse(message) {
                Resolution::Command(intent) => intent,
                _ => return false,
            },
        };
        let command = intent.command;

        if self.wizard.is_active(&WizardKey::for_message(message)).await {
            debug!("Wizard owns the conversation, ignoring {}", command);
            return false;
        }

        let spec = self.registry.get(command);

        let decision = self
            .gate
            .is_allowed(command, &message.chat_id, &message.author)
            .await;
        if !decision.allowed {
            info!("{} denied ({:?})", command, decision.rule);
            if let Some(spec) = spec {
                self.reply_error(message, spec, ErrorKind::NotAllowed).await;
            }
            return false;
        }

        let Some(spec) = spec.filter(|s| s.is_well_formed()) else {
            error!("Command {} has no usable configuration", command);
            return false;
        };

        let Some(handler) = self.handlers.get(command) else {
            error!("No handler registered for {}", command);
            return false;
        };

        let ctx = CommandContext::new(
            message,
            spec,
            &intent.input,
            intent.hint.as_ref(),
            self.messenger.as_ref(),
            &self.queue,
        );

        match AssertUnwindSafe(handler.execute(&ctx)).catch_unwind().await {
            Ok(Ok(())) => {
                if spec.auto_delete.command_messages {
                    self.queue
                        .enqueue(
                            MessageRef::new(&message.chat_id, &message.id),
                            spec.auto_delete.delete_timeout,
                        )
                        .await;
                }
                debug!("{} completed", command);
                true
            }
            Ok(Err(e)) => {
                error!("{} failed for {} in {}: {}", command, message.author, message.chat_id, e);
                self.reply_error(message, spec, ErrorKind::Error).await;
                false
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_default();
                error!(
                    "{} panicked for {} in {}: {}",
                    command, message.author, message.chat_id, reason
                );
                self.reply_error(message, spec, ErrorKind::Error).await;
                false
            }
        }
    }

    /// Send one of the spec's error messages; silent when it has none.
    async fn reply_error(&self, message: &BotMessage, spec: &CommandSpec, kind: ErrorKind) {
        let Some(text) = spec.error_message(kind) else {
            return;
        };

        let reply = OutgoingText::new(text).quoting(message.id.clone());
        match self.messenger.send_text(&message.chat_id, &reply).await {
            Ok(sent) => {
                if spec.auto_delete.error_messages {
                    self.queue
                        .enqueue(
                            MessageRef::new(&message.chat_id, sent.id),
                            spec.auto_delete.delete_timeout,
                        )
                        .await;
                }
            }
            Err(e) => warn!("Failed to send error reply: {}", e),
        }
    }
}
