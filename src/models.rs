use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// Remote signing request/response kinds
pub const KIND_NOSTR_CONNECT: u16 = 24133;
pub const KIND_NOSTR_CONNECT_LEGACY: u16 = 24135;

pub const SUPPORTED_KINDS: [u16; 2] = [KIND_NOSTR_CONNECT, KIND_NOSTR_CONNECT_LEGACY];

pub fn is_supported_kind(kind: u16) -> bool {
    SUPPORTED_KINDS.contains(&kind)
}

// Signed event as received from clients. Also the record kept in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub pubkey: String, // author identity
    pub created_at: i64, // unix seconds
    pub kind: u16,
    #[serde(default)]
    pub tags: Vec<Vec<String>>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub sig: String,
}

impl Event {
    // values of every tag named `name`, e.g. "p" for recipients
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags
            .iter()
            .filter(move |tag| tag.first().map(String::as_str) == Some(name))
            .filter_map(|tag| tag.get(1).map(String::as_str))
    }
}

// Subscription/query filter. Tag queries arrive as "#p", "#e", ...
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(flatten)]
    pub tags: BTreeMap<String, Vec<String>>,
}

impl Filter {
    // tag values requested for a single-letter tag, without the '#'
    pub fn tag(&self, name: &str) -> &[String] {
        self.tags
            .get(&format!("#{name}"))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn matches(&self, event: &Event) -> bool {
        if !self.ids.is_empty() && !self.ids.contains(&event.id) {
            return false;
        }
        if !self.authors.is_empty() && !self.authors.contains(&event.pubkey) {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind) {
            return false;
        }
        if self.since.is_some_and(|since| event.created_at < since) {
            return false;
        }
        if self.until.is_some_and(|until| event.created_at > until) {
            return false;
        }

        self.tags.iter().all(|(key, wanted)| {
            let Some(name) = key.strip_prefix('#') else {
                return true;
            };
            wanted.is_empty() || event.tag_values(name).any(|v| wanted.iter().any(|w| w == v))
        })
    }
}
