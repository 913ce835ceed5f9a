//! Command table: the closed set of commands, their triggers and reply policy.

use crate::error::CatalogError;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

/// Character that marks a literal command.
pub const COMMAND_MARKER: char = '#';

/// Every command the bot knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandName {
    Resumo,
    ChatGpt,
    Tag,
    News,
    Image,
    Audio,
    CommandList,
    CacheClear,
    Configurar,
}

impl CommandName {
    pub const ALL: [CommandName; 9] = [
        CommandName::Resumo,
        CommandName::ChatGpt,
        CommandName::Tag,
        CommandName::News,
        CommandName::Image,
        CommandName::Audio,
        CommandName::CommandList,
        CommandName::CacheClear,
        CommandName::Configurar,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandName::Resumo => "RESUMO",
            CommandName::ChatGpt => "CHAT_GPT",
            CommandName::Tag => "TAG",
            CommandName::News => "NEWS",
            CommandName::Image => "IMAGE",
            CommandName::Audio => "AUDIO",
            CommandName::CommandList => "COMMAND_LIST",
            CommandName::CacheClear => "CACHE_CLEAR",
            CommandName::Configurar => "CONFIGURAR",
        }
    }

    /// Case-insensitive lookup; configuration keys may arrive lower-cased.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-facing error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotAllowed,
    Error,
    NoPrompt,
    InvalidFormat,
    NoMessages,
    NoMedia,
    NoMembers,
    GroupOnly,
}

/// Whether replies and triggering messages get deleted, and when.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct AutoDeletePolicy {
    /// Delete the bot's error replies.
    #[serde(default)]
    pub error_messages: bool,
    /// Delete the bot's normal replies and the message that triggered them.
    #[serde(default)]
    pub command_messages: bool,
    #[serde(with = "humantime_serde")]
    pub delete_timeout: Duration,
}

impl AutoDeletePolicy {
    pub const fn new(error_messages: bool, command_messages: bool, delete_timeout: Duration) -> Self {
        Self {
            error_messages,
            command_messages,
            delete_timeout,
        }
    }
}

impl Default for AutoDeletePolicy {
    fn default() -> Self {
        Self::new(true, false, Duration::from_secs(60))
    }
}

/// Static description of one command.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub name: CommandName,
    /// Literal triggers, checked in order.
    pub prefixes: Vec<String>,
    pub description: String,
    pub auto_delete: AutoDeletePolicy,
    /// `None` marks a structurally broken spec.
    pub error_messages: Option<HashMap<ErrorKind, String>>,
    /// Entering this command hands the conversation to a wizard.
    pub wizard: bool,
    /// Lowercase hex SHA-256 of a sticker that triggers this command.
    pub sticker_hash: Option<String>,
}

impl CommandSpec {
    pub fn new(name: CommandName, description: impl Into<String>) -> Self {
        let mut error_messages = HashMap::new();
        error_messages.insert(
            ErrorKind::NotAllowed,
            "Você não tem permissão para usar este comando aqui.".to_string(),
        );
        error_messages.insert(
            ErrorKind::Error,
            "Ocorreu um erro ao executar o comando. Tente novamente mais tarde.".to_string(),
        );

        Self {
            name,
            prefixes: Vec::new(),
            description: description.into(),
            auto_delete: AutoDeletePolicy::default(),
            error_messages: Some(error_messages),
            wizard: false,
            sticker_hash: None,
        }
    }

    pub fn with_prefixes(mut self, prefixes: &[&str]) -> Self {
        self.prefixes = prefixes.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_auto_delete(mut self, policy: AutoDeletePolicy) -> Self {
        self.auto_delete = policy;
        self
    }

    pub fn with_error(mut self, kind: ErrorKind, message: impl Into<String>) -> Self {
        self.error_messages
            .get_or_insert_with(HashMap::new)
            .insert(kind, message.into());
        self
    }

    pub fn as_wizard(mut self) -> Self {
        self.wizard = true;
        self
    }

    pub fn error_message(&self, kind: ErrorKind) -> Option<&str> {
        self.error_messages
            .as_ref()
            .and_then(|m| m.get(&kind))
            .map(String::as_str)
    }

    /// A spec without an error-message map cannot be dispatched.
    pub fn is_well_formed(&self) -> bool {
        self.error_messages.is_some()
    }

    /// Short alias shown to users and to the language model.
    pub fn primary_alias(&self) -> String {
        self.prefixes
            .first()
            .map(|p| p.trim_start_matches(COMMAND_MARKER).to_lowercase())
            .unwrap_or_else(|| self.name.as_str().to_lowercase())
    }
}

/// The command table, built once at startup.
#[derive(Debug, Clone)]
pub struct CommandRegistry {
    specs: Vec<CommandSpec>,
    /// Short alias -> command. Shared by literal matching and NLP replies.
    aliases: HashMap<String, CommandName>,
}

impl CommandRegistry {
    /// Build a registry, rejecting duplicate names and overlapping prefixes.
    pub fn new(specs: Vec<CommandSpec>) -> Result<Self, CatalogError> {
        let mut names = HashSet::new();
        let mut prefixes: HashMap<String, CommandName> = HashMap::new();

        for spec in &specs {
            if !names.insert(spec.name) {
                return Err(CatalogError::DuplicateName(spec.name.to_string()));
            }
            for prefix in &spec.prefixes {
                let key = prefix.to_lowercase();
                if let Some(first) = prefixes.insert(key, spec.name) {
                    return Err(CatalogError::DuplicatePrefix {
                        prefix: prefix.clone(),
                        first: first.to_string(),
                        second: spec.name.to_string(),
                    });
                }
            }
        }

        let mut aliases = HashMap::new();
        for spec in &specs {
            aliases
                .entry(spec.name.as_str().to_lowercase())
                .or_insert(spec.name);
            for prefix in &spec.prefixes {
                let alias = prefix.trim_start_matches(COMMAND_MARKER).to_lowercase();
                if !alias.is_empty() {
                    aliases.entry(alias).or_insert(spec.name);
                }
            }
        }

        Ok(Self { specs, aliases })
    }

    /// The built-in command set.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::new(builtin_specs())
    }

    pub fn get(&self, name: CommandName) -> Option<&CommandSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    /// Specs in registration order.
    pub fn specs(&self) -> impl Iterator<Item = &CommandSpec> {
        self.specs.iter()
    }

    /// Resolve a short alias such as `resumo` or `#resumo` (any case).
    pub fn resolve_alias(&self, token: &str) -> Option<CommandName> {
        let alias = token.trim().trim_start_matches(COMMAND_MARKER).to_lowercase();
        self.aliases.get(&alias).copied()
    }

    pub fn by_sticker_hash(&self, hash: &str) -> Option<&CommandSpec> {
        self.specs.iter().find(|s| {
            s.sticker_hash
                .as_deref()
                .is_some_and(|h| h.eq_ignore_ascii_case(hash))
        })
    }

    /// Adjust one spec after construction (config overrides).
    pub fn configure(&mut self, name: CommandName, f: impl FnOnce(&mut CommandSpec)) {
        if let Some(spec) = self.specs.iter_mut().find(|s| s.name == name) {
            f(spec);
        }
    }
}

fn builtin_specs() -> Vec<CommandSpec> {
    let minute = Duration::from_secs(60);

    vec![
        CommandSpec::new(
            CommandName::Resumo,
            "Resume a conversa do grupo. Aceita um número de mensagens (ex.: 50), \
             'hoje', 'ontem', '<N> minutos' ou '<N> horas'.",
        )
        .with_prefixes(&["#resumo", "#resume"])
        .with_auto_delete(AutoDeletePolicy::new(true, false, minute))
        .with_error(
            ErrorKind::InvalidFormat,
            "Formato inválido. Use #resumo <número>, hoje, ontem, <N> minutos ou <N> horas.",
        )
        .with_error(
            ErrorKind::NoMessages,
            "Não encontrei mensagens para resumir nesse período.",
        ),
        CommandSpec::new(
            CommandName::ChatGpt,
            "Responde perguntas livres com IA. Pode usar a mensagem citada como contexto.",
        )
        .with_prefixes(&["#gpt", "#chatgpt", "#ia"])
        .with_auto_delete(AutoDeletePolicy::new(true, false, minute))
        .with_error(
            ErrorKind::NoPrompt,
            "Escreva sua pergunta depois do comando, ex.: #gpt qual a capital da Austrália?",
        ),
        CommandSpec::new(
            CommandName::Tag,
            "Menciona membros do grupo: @todos marca todo mundo, @admin marca os \
             administradores e tags do grupo marcam membros específicos.",
        )
        .with_auto_delete(AutoDeletePolicy::new(true, true, Duration::from_secs(30)))
        .with_error(ErrorKind::InvalidFormat, "Não conheço essa tag neste grupo.")
        .with_error(ErrorKind::NoMembers, "Nenhum membro corresponde a essa tag.")
        .with_error(ErrorKind::GroupOnly, "Tags só funcionam em grupos."),
        CommandSpec::new(
            CommandName::News,
            "Busca as notícias mais recentes sobre um assunto, com link das fontes.",
        )
        .with_prefixes(&["#news", "#noticias"])
        .with_auto_delete(AutoDeletePolicy::new(true, false, minute))
        .with_error(
            ErrorKind::NoPrompt,
            "Diga o assunto das notícias, ex.: #news eleições.",
        ),
        CommandSpec::new(CommandName::Image, "Gera uma imagem a partir de uma descrição.")
            .with_prefixes(&["#img", "#imagem"])
            .with_auto_delete(AutoDeletePolicy::new(true, false, minute))
            .with_error(
                ErrorKind::NoPrompt,
                "Descreva a imagem depois do comando, ex.: #img um gato astronauta.",
            ),
        CommandSpec::new(
            CommandName::Audio,
            "Transcreve um áudio ou mensagem de voz citada.",
        )
        .with_prefixes(&["#audio", "#transcrever"])
        .with_auto_delete(AutoDeletePolicy::new(true, false, minute))
        .with_error(
            ErrorKind::NoMedia,
            "Responda a um áudio com #audio para transcrevê-lo.",
        ),
        CommandSpec::new(
            CommandName::CommandList,
            "Mostra a lista de comandos disponíveis.",
        )
        .with_prefixes(&["#comandos", "#ajuda", "#help"])
        .with_auto_delete(AutoDeletePolicy::new(true, true, 2 * minute)),
        CommandSpec::new(
            CommandName::CacheClear,
            "Limpa o cache de notícias (somente administrador).",
        )
        .with_prefixes(&["#limparcache"])
        .with_auto_delete(AutoDeletePolicy::new(true, true, Duration::from_secs(30))),
        CommandSpec::new(
            CommandName::Configurar,
            "Abre o assistente de configuração do chat (tamanho padrão do #resumo).",
        )
        .with_prefixes(&["#configurar"])
        .with_auto_delete(AutoDeletePolicy::new(true, true, minute))
        .as_wizard(),
    ]
}
