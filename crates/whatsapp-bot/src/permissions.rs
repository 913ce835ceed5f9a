//! Chat-scoped command permissions.

use crate::catalog::CommandName;
use serde::{Deserialize, Deserializer};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};
use whatsapp_client::{is_direct_chat, user_part, Messenger};

/// Allow-list entry prefix granting direct messages to members of a group.
pub const DM_GROUP_PREFIX: &str = "dm.";

/// Chats a command (or the NLP fallback) is available in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowList {
    All,
    Only(Vec<String>),
}

impl Default for AllowList {
    fn default() -> Self {
        AllowList::Only(Vec::new())
    }
}

impl AllowList {
    fn from_entries(entries: Vec<String>) -> Self {
        let entries: Vec<String> = entries
            .into_iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();

        if entries.iter().any(|e| e.eq_ignore_ascii_case("all")) {
            AllowList::All
        } else {
            AllowList::Only(entries)
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, AllowList::Only(entries) if entries.is_empty())
    }

    pub fn contains(&self, chat_id: &str) -> bool {
        match self {
            AllowList::All => true,
            AllowList::Only(entries) => entries.iter().any(|e| e == chat_id),
        }
    }

    /// Group names listed as `dm.<group>`.
    pub fn dm_groups(&self) -> impl Iterator<Item = &str> {
        let entries = match self {
            AllowList::All => &[][..],
            AllowList::Only(entries) => entries.as_slice(),
        };
        entries
            .iter()
            .filter_map(|e| e.strip_prefix(DM_GROUP_PREFIX))
            .filter(|g| !g.is_empty())
    }
}

impl<'de> Deserialize<'de> for AllowList {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            // "all", or comma separated when set from the environment
            One(String),
            Many(Vec<String>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::One(s) => AllowList::from_entries(s.split(',').map(String::from).collect()),
            Raw::Many(entries) => AllowList::from_entries(entries),
        })
    }
}

/// Permission configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PermissionsConfig {
    /// Operator identity, exempt from every check
    #[serde(default)]
    pub admin: Option<String>,

    /// Chat where every command is allowed
    #[serde(default)]
    pub test_chat: Option<String>,

    /// Commands that need an explicit allow-list entry
    #[serde(default = "default_admin_only")]
    pub admin_only: Vec<String>,

    /// Command name -> allow-list
    #[serde(default)]
    pub allow: HashMap<String, AllowList>,

    /// Chats where the natural-language fallback runs
    #[serde(default)]
    pub nlp: AllowList,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            admin: None,
            test_chat: None,
            admin_only: default_admin_only(),
            allow: HashMap::new(),
            nlp: AllowList::default(),
        }
    }
}

fn default_admin_only() -> Vec<String> {
    vec![
        CommandName::CacheClear.as_str().to_string(),
        CommandName::Configurar.as_str().to_string(),
    ]
}

/// Which rule decided a permission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionRule {
    Admin,
    TestChat,
    NoAllowList,
    AllChats,
    AdminOnly,
    ChatListed,
    GroupMember(String),
    NotListed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionDecision {
    pub allowed: bool,
    pub rule: PermissionRule,
}

impl PermissionDecision {
    fn allow(rule: PermissionRule) -> Self {
        Self { allowed: true, rule }
    }

    fn deny(rule: PermissionRule) -> Self {
        Self {
            allowed: false,
            rule,
        }
    }
}

/// Decides whether a user may run a command in a chat.
pub struct PermissionGate {
    admin: Option<String>,
    test_chat: Option<String>,
    admin_only: HashSet<CommandName>,
    allow: HashMap<CommandName, AllowList>,
    nlp: AllowList,
    messenger: Arc<dyn Messenger>,
}

impl PermissionGate {
    pub fn new(config: &PermissionsConfig, messenger: Arc<dyn Messenger>) -> Self {
        let admin_only = config
            .admin_only
            .iter()
            .filter_map(|name| {
                let parsed = CommandName::parse(name);
                if parsed.is_none() {
                    warn!("Unknown admin-only command {}", name);
                }
                parsed
            })
            .collect();

        let mut allow = HashMap::new();
        for (name, list) in &config.allow {
            match CommandName::parse(name) {
                Some(command) => {
                    allow.insert(command, list.clone());
                }
                None => warn!("Ignoring allow-list for unknown command {}", name),
            }
        }

        Self {
            admin: config.admin.clone().filter(|a| !a.is_empty()),
            test_chat: config.test_chat.clone().filter(|c| !c.is_empty()),
            admin_only,
            allow,
            nlp: config.nlp.clone(),
            messenger,
        }
    }

    /// Whether `user_id` is the operator. Compares the number part only.
    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admin
            .as_deref()
            .is_some_and(|admin| user_part(admin) == user_part(user_id))
    }

    pub async fn is_allowed(
        &self,
        command: CommandName,
        chat_id: &str,
        user_id: &str,
    ) -> PermissionDecision {
        if self.is_admin(user_id) {
            return PermissionDecision::allow(PermissionRule::Admin);
        }
        if self.test_chat.as_deref() == Some(chat_id) {
            return PermissionDecision::allow(PermissionRule::TestChat);
        }

        let Some(list) = self.allow.get(&command) else {
            return PermissionDecision::deny(PermissionRule::NoAllowList);
        };
        if *list == AllowList::All {
            return PermissionDecision::allow(PermissionRule::AllChats);
        }
        if self.admin_only.contains(&command) && list.is_empty() {
            return PermissionDecision::deny(PermissionRule::AdminOnly);
        }

        let decision = self.check_list(list, chat_id, user_id).await;
        debug!(
            "Permission for {} in {}: {:?}",
            command, chat_id, decision.rule
        );
        decision
    }

    /// Whether the natural-language fallback may run for this actor.
    pub async fn nlp_allowed(&self, chat_id: &str, user_id: &str) -> bool {
        if is_direct_chat(chat_id) && self.is_admin(user_id) {
            return true;
        }
        if self.test_chat.as_deref() == Some(chat_id) {
            return true;
        }
        self.check_list(&self.nlp, chat_id, user_id).await.allowed
    }

    async fn check_list(&self, list: &AllowList, chat_id: &str, user_id: &str) -> PermissionDecision {
        if list.contains(chat_id) {
            return PermissionDecision::allow(PermissionRule::ChatListed);
        }

        if is_direct_chat(chat_id) {
            for group in list.dm_groups() {
                if self.is_group_member(group, user_id).await {
                    return PermissionDecision::allow(PermissionRule::GroupMember(group.to_string()));
                }
            }
        }

        PermissionDecision::deny(PermissionRule::NotListed)
    }

    async fn is_group_member(&self, group: &str, user_id: &str) -> bool {
        match self.messenger.find_group(group).await {
            Ok(Some(chat)) => chat.has_participant(user_id),
            Ok(None) => {
                debug!("Group {} not found", group);
                false
            }
            Err(e) => {
                warn!("Membership lookup for {} failed: {}", group, e);
                false
            }
        }
    }
}
