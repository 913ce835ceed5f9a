//! Literal intent resolution: mentions, tags, prefixes and the bare marker.

use crate::catalog::{CommandName, CommandRegistry, COMMAND_MARKER};
use crate::error::AppResult;
use crate::tags::TagBook;
use regex::Regex;
use std::sync::Arc;
use whatsapp_client::{user_part, BotMessage};

/// Attachment the language model pointed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentHint {
    Quote(String),
    Media(String),
}

impl AttachmentHint {
    pub fn message_id(&self) -> &str {
        match self {
            AttachmentHint::Quote(id) | AttachmentHint::Media(id) => id,
        }
    }
}

/// A command to run and its input, detached from the transport message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedIntent {
    pub command: CommandName,
    pub input: String,
    pub hint: Option<AttachmentHint>,
}

impl ParsedIntent {
    pub fn new(command: CommandName, input: impl Into<String>) -> Self {
        Self {
            command,
            input: input.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: AttachmentHint) -> Self {
        self.hint = Some(hint);
        self
    }
}

/// Outcome of literal parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Command(ParsedIntent),
    /// The bot was addressed; the text (mention removed) goes to the language model.
    Natural(String),
    /// `@word` that is not a tag. Nothing else may handle it.
    Rejected,
    NoMatch,
}

/// Deterministic, synchronous first stage of message handling.
pub struct IntentParser {
    registry: Arc<CommandRegistry>,
    tags: Arc<TagBook>,
    bot_id: String,
    mention: Regex,
}

impl IntentParser {
    pub fn new(
        registry: Arc<CommandRegistry>,
        tags: Arc<TagBook>,
        bot_id: impl Into<String>,
    ) -> AppResult<Self> {
        let bot_id = bot_id.into();
        let mention = Regex::new(&format!(r"@{}\b", regex::escape(user_part(&bot_id))))?;

        Ok(Self {
            registry,
            tags,
            bot_id,
            mention,
        })
    }

    pub fn bot_id(&self) -> &str {
        &self.bot_id
    }

    /// Whether the message addresses the bot, by mention metadata or by text.
    pub fn mentions_bot(&self, message: &BotMessage) -> bool {
        message.mentions(&self.bot_id) || self.mention.is_match(&message.text)
    }

    /// Remove every `@<bot number>` token and collapse the leftover spacing.
    pub fn strip_bot_mention(&self, text: &str) -> String {
        let stripped = self.mention.replace_all(text, " ");
        stripped.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    pub fn parse(&self, message: &BotMessage) -> Resolution {
        let text = message.text.trim();
        let mentions_bot = self.mentions_bot(message);

        if message.is_group && mentions_bot {
            return Resolution::Natural(self.strip_bot_mention(text));
        }

        if let Some(first) = text.split_whitespace().next() {
            if first.starts_with('@') && !mentions_bot {
                return match self.tags.resolve(first, message.chat_name.as_deref()) {
                    Some(_) => Resolution::Command(ParsedIntent::new(CommandName::Tag, text)),
                    None => Resolution::Rejected,
                };
            }
        }

        for spec in self.registry.specs() {
            for prefix in &spec.prefixes {
                if let Some(rest) = match_prefix(text, prefix) {
                    return Resolution::Command(ParsedIntent::new(spec.name, rest));
                }
            }
        }

        if let Some(rest) = text.strip_prefix(COMMAND_MARKER) {
            let chat_ready = self
                .registry
                .get(CommandName::ChatGpt)
                .is_some_and(|spec| spec.is_well_formed());
            if chat_ready {
                return Resolution::Command(ParsedIntent::new(CommandName::ChatGpt, rest.trim()));
            }
        }

        Resolution::NoMatch
    }
}

/// Case-insensitive prefix match. The prefix must be the whole text or be
/// followed by whitespace; returns the trimmed remainder.
pub fn match_prefix<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() {
        return None;
    }
    let head = text.get(..prefix.len())?;
    if head.to_lowercase() != prefix.to_lowercase() {
        return None;
    }

    let rest = &text[prefix.len()..];
    if rest.is_empty() {
        Some("")
    } else if rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        None
    }
}
