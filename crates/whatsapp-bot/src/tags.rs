//! Mention tags: `@todos`, `@admin` and per-group named tags.

use serde::Deserialize;
use std::collections::HashMap;
use whatsapp_client::{user_part, Participant};

/// Who a special tag reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagScope {
    AllMembers,
    AdminOnly,
}

/// Tag configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TagsConfig {
    /// Special tag name -> scope, valid in every group
    #[serde(default = "default_special_tags")]
    pub special: HashMap<String, TagScope>,

    /// Group name -> tag name -> member name filters
    #[serde(default)]
    pub groups: HashMap<String, HashMap<String, Vec<String>>>,
}

impl Default for TagsConfig {
    fn default() -> Self {
        Self {
            special: default_special_tags(),
            groups: HashMap::new(),
        }
    }
}

fn default_special_tags() -> HashMap<String, TagScope> {
    HashMap::from([
        ("todos".to_string(), TagScope::AllMembers),
        ("all".to_string(), TagScope::AllMembers),
        ("admin".to_string(), TagScope::AdminOnly),
        ("admins".to_string(), TagScope::AdminOnly),
    ])
}

/// What a resolved tag expands to.
#[derive(Debug, Clone, PartialEq)]
pub enum TagTarget {
    Special(TagScope),
    /// Members whose name contains one of the filters.
    Members(Vec<String>),
}

/// `@Admin` -> `admin`.
pub fn normalize_tag(token: &str) -> String {
    token.trim().trim_start_matches('@').to_lowercase()
}

/// Case-insensitive tag lookup table.
#[derive(Debug, Clone, Default)]
pub struct TagBook {
    special: HashMap<String, TagScope>,
    groups: HashMap<String, HashMap<String, Vec<String>>>,
}

impl TagBook {
    pub fn from_config(config: &TagsConfig) -> Self {
        let special = config
            .special
            .iter()
            .map(|(tag, scope)| (normalize_tag(tag), *scope))
            .collect();

        let groups = config
            .groups
            .iter()
            .map(|(group, tags)| {
                let tags = tags
                    .iter()
                    .map(|(tag, filters)| (normalize_tag(tag), filters.clone()))
                    .collect();
                (group.to_lowercase(), tags)
            })
            .collect();

        Self { special, groups }
    }

    /// Resolve `@name` for a chat. Special tags win over group tags.
    pub fn resolve(&self, token: &str, chat_name: Option<&str>) -> Option<TagTarget> {
        let tag = normalize_tag(token);
        if tag.is_empty() {
            return None;
        }
        if let Some(scope) = self.special.get(&tag) {
            return Some(TagTarget::Special(*scope));
        }

        let group = chat_name?.to_lowercase();
        self.groups
            .get(&group)
            .and_then(|tags| tags.get(&tag))
            .map(|filters| TagTarget::Members(filters.clone()))
    }

    /// Tags usable in a chat, sorted, with their `@`.
    pub fn tags_for(&self, chat_name: Option<&str>) -> Vec<String> {
        let mut tags: Vec<String> = self.special.keys().map(|t| format!("@{}", t)).collect();
        if let Some(group_tags) = chat_name.and_then(|n| self.groups.get(&n.to_lowercase())) {
            tags.extend(group_tags.keys().map(|t| format!("@{}", t)));
        }
        tags.sort();
        tags.dedup();
        tags
    }
}

/// Participants reached by a tag.
pub fn select_members<'a>(target: &TagTarget, participants: &'a [Participant]) -> Vec<&'a Participant> {
    participants
        .iter()
        .filter(|p| match target {
            TagTarget::Special(TagScope::AllMembers) => true,
            TagTarget::Special(TagScope::AdminOnly) => p.is_admin,
            TagTarget::Members(filters) => {
                let name = p.name.as_deref().unwrap_or_default().to_lowercase();
                let number = user_part(&p.id);
                filters.iter().any(|f| {
                    let f = f.trim().to_lowercase();
                    !f.is_empty() && (name.contains(&f) || number == f)
                })
            }
        })
        .collect()
}
