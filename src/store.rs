use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use crate::models::{Event, Filter};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Backing storage for relay events.
///
/// The relay may be wired to several stores. Saves go to all of them, the
/// pruner queries each one and deletes expired records from the stores
/// that returned them.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn query(&self, filter: &Filter) -> Result<Vec<Event>, StoreError>;

    async fn delete(&self, event: &Event) -> Result<(), StoreError>;

    async fn save(&self, event: &Event) -> Result<(), StoreError>;
}

// In-memory store keyed by event id
#[derive(Debug, Default)]
pub struct MemoryStore {
    events: DashMap<String, Event>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.events.contains_key(id)
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn query(&self, filter: &Filter) -> Result<Vec<Event>, StoreError> {
        let mut found: Vec<Event> = self
            .events
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        // newest first, like a relay answering a REQ
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn delete(&self, event: &Event) -> Result<(), StoreError> {
        // deleting something already gone is fine
        self.events.remove(&event.id);
        Ok(())
    }

    async fn save(&self, event: &Event) -> Result<(), StoreError> {
        self.events.insert(event.id.clone(), event.clone());
        Ok(())
    }
}
