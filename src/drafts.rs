use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::planner::model::DraftPlan;
use crate::storage::StorageClient;

pub const HISTORY_CAPACITY: usize = 100;

const JSON: &str = "application/json";

/// Durable slot holding the plan a user is working on.
#[async_trait]
pub trait DraftStore: Send + Sync {
    /// Errors when the slot exists but cannot be read back as a draft.
    async fn load(&self, user_id: Uuid) -> anyhow::Result<Option<DraftPlan>>;
    async fn save(&self, user_id: Uuid, draft: &DraftPlan) -> anyhow::Result<()>;
    async fn clear(&self, user_id: Uuid) -> anyhow::Result<()>;
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn load(&self, user_id: Uuid) -> anyhow::Result<MealHistory>;
    async fn save(&self, user_id: Uuid, history: &MealHistory) -> anyhow::Result<()>;
}

/// Meal names the user has typed, oldest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MealHistory {
    entries: Vec<String>,
}

impl MealHistory {
    /// Records a name. Blank names and names already present are ignored;
    /// past capacity the oldest entry is evicted. Returns whether it changed.
    pub fn add(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() || self.entries.iter().any(|e| e == name) {
            return false;
        }
        self.entries.push(name.to_string());
        if self.entries.len() > HISTORY_CAPACITY {
            let excess = self.entries.len() - HISTORY_CAPACITY;
            self.entries.drain(..excess);
        }
        true
    }

    pub fn newest_first(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().rev().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Drops a draft that belongs to someone else.
pub fn accept_draft(user_id: Uuid, draft: Option<DraftPlan>) -> Option<DraftPlan> {
    match draft {
        Some(d) if d.user_id == user_id => Some(d),
        Some(d) => {
            warn!(user_id = %user_id, owner = %d.user_id, "discarding draft of another user");
            None
        }
        None => None,
    }
}

/// Draft and history slots stored as JSON objects.
#[derive(Clone)]
pub struct ObjectSlots {
    storage: Arc<dyn StorageClient>,
}

impl ObjectSlots {
    pub fn new(storage: Arc<dyn StorageClient>) -> Self {
        Self { storage }
    }

    fn draft_key(user_id: Uuid) -> String {
        format!("drafts/{}.json", user_id)
    }

    fn history_key(user_id: Uuid) -> String {
        format!("history/{}.json", user_id)
    }
}

#[async_trait]
impl DraftStore for ObjectSlots {
    async fn load(&self, user_id: Uuid) -> anyhow::Result<Option<DraftPlan>> {
        let Some(raw) = self.storage.get_object(&Self::draft_key(user_id)).await? else {
            return Ok(None);
        };
        let draft = serde_json::from_slice(&raw).context("decode draft")?;
        Ok(Some(draft))
    }

    async fn save(&self, user_id: Uuid, draft: &DraftPlan) -> anyhow::Result<()> {
        let body = serde_json::to_vec(draft).context("encode draft")?;
        self.storage
            .put_object(&Self::draft_key(user_id), Bytes::from(body), JSON)
            .await
    }

    async fn clear(&self, user_id: Uuid) -> anyhow::Result<()> {
        self.storage.delete_object(&Self::draft_key(user_id)).await
    }
}

#[async_trait]
impl HistoryStore for ObjectSlots {
    async fn load(&self, user_id: Uuid) -> anyhow::Result<MealHistory> {
        let Some(raw) = self.storage.get_object(&Self::history_key(user_id)).await? else {
            return Ok(MealHistory::default());
        };
        match serde_json::from_slice(&raw) {
            Ok(history) => Ok(history),
            Err(e) => {
                warn!(error = %e, user_id = %user_id, "unreadable meal history, starting fresh");
                Ok(MealHistory::default())
            }
        }
    }

    async fn save(&self, user_id: Uuid, history: &MealHistory) -> anyhow::Result<()> {
        let body = serde_json::to_vec(history).context("encode history")?;
        self.storage
            .put_object(&Self::history_key(user_id), Bytes::from(body), JSON)
            .await
    }
}
