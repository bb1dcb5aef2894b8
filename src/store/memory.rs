//! In-memory reference stores.
//!
//! Back the demo binary and the test suites. Position ordering, context
//! trimming, and soft deletion behave exactly as a SQL-backed
//! implementation is expected to.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::chat::ChatMessage;
use crate::store::{
    ConversationInfo, MessageRole, MessageStore, NewMessage, RegionQuery, RegionStore, StoreError,
    StoredMessage, StoredRegion,
};

#[derive(Debug, Clone)]
struct ConversationSeed {
    user_id: String,
    model_id: Option<String>,
}

/// A fully materialized message row, exposed for inspection in tests.
#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub token_count: u32,
    pub model_id: Option<String>,
    pub cost_micro: Option<u64>,
    pub position: u32,
    pub input_cost_snapshot_micro: Option<u64>,
    pub output_cost_snapshot_micro: Option<u64>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

/// Message storage held entirely in process memory.
#[derive(Default)]
pub struct InMemoryMessageStore {
    conversations: DashMap<Uuid, ConversationSeed>,
    messages: RwLock<Vec<MessageRow>>,
    fail_assistant_creates: AtomicBool,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a conversation and return its id.
    pub fn create_conversation(&self, user_id: &str, model_id: Option<&str>) -> Uuid {
        let id = Uuid::new_v4();
        self.conversations.insert(
            id,
            ConversationSeed {
                user_id: user_id.to_string(),
                model_id: model_id.map(str::to_string),
            },
        );
        id
    }

    /// When set, every assistant-message insert fails. Lets tests drive
    /// the compensating soft-delete path.
    pub fn fail_assistant_creates(&self, fail: bool) {
        self.fail_assistant_creates.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of one row, including soft-deleted ones.
    pub fn message(&self, message_id: Uuid) -> Option<MessageRow> {
        self.messages
            .read()
            .iter()
            .find(|m| m.id == message_id)
            .cloned()
    }

    /// All rows of a conversation in position order, including deleted.
    pub fn messages_in(&self, conversation_id: Uuid) -> Vec<MessageRow> {
        let mut rows: Vec<MessageRow> = self
            .messages
            .read()
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.position);
        rows
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn find_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<ConversationInfo>, StoreError> {
        let Some(seed) = self.conversations.get(&conversation_id) else {
            return Ok(None);
        };
        let message_count = self
            .messages
            .read()
            .iter()
            .filter(|m| m.conversation_id == conversation_id && !m.deleted)
            .count();
        Ok(Some(ConversationInfo {
            id: conversation_id,
            user_id: seed.user_id.clone(),
            message_count,
            model_id: seed.model_id.clone(),
        }))
    }

    async fn context_messages(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let mut rows: Vec<MessageRow> = self
            .messages
            .read()
            .iter()
            .filter(|m| m.conversation_id == conversation_id && !m.deleted)
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.position);
        let skip = rows.len().saturating_sub(limit);
        Ok(rows
            .into_iter()
            .skip(skip)
            .map(|m| match m.role {
                MessageRole::User => ChatMessage::user(m.content),
                MessageRole::Assistant => ChatMessage::assistant(m.content),
            })
            .collect())
    }

    async fn next_position(&self, conversation_id: Uuid) -> Result<u32, StoreError> {
        // Deleted rows keep their slot so positions stay unique.
        Ok(self
            .messages
            .read()
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .map(|m| m.position + 1)
            .max()
            .unwrap_or(0))
    }

    async fn create_message(&self, message: NewMessage) -> Result<StoredMessage, StoreError> {
        if !self.conversations.contains_key(&message.conversation_id) {
            return Err(StoreError::NotFound(format!(
                "conversation {}",
                message.conversation_id
            )));
        }
        if message.role == MessageRole::Assistant
            && self.fail_assistant_creates.load(Ordering::SeqCst)
        {
            return Err(StoreError::Operation(
                "simulated assistant write failure".to_string(),
            ));
        }
        let row = MessageRow {
            id: Uuid::new_v4(),
            conversation_id: message.conversation_id,
            role: message.role,
            content: message.content,
            token_count: message.token_count,
            model_id: message.model_id,
            cost_micro: message.cost_micro,
            position: message.position,
            input_cost_snapshot_micro: message.input_cost_snapshot_micro,
            output_cost_snapshot_micro: message.output_cost_snapshot_micro,
            deleted: false,
            created_at: Utc::now(),
        };
        let stored = StoredMessage {
            id: row.id,
            created_at: row.created_at,
        };
        self.messages.write().push(row);
        Ok(stored)
    }

    async fn update_token_count(
        &self,
        message_id: Uuid,
        token_count: u32,
    ) -> Result<(), StoreError> {
        let mut rows = self.messages.write();
        let row = rows
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| StoreError::NotFound(format!("message {message_id}")))?;
        row.token_count = token_count;
        Ok(())
    }

    async fn soft_delete(&self, message_id: Uuid) -> Result<(), StoreError> {
        let mut rows = self.messages.write();
        let row = rows
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| StoreError::NotFound(format!("message {message_id}")))?;
        row.deleted = true;
        Ok(())
    }
}

/// Region storage held entirely in process memory.
#[derive(Default)]
pub struct InMemoryRegionStore {
    rows: RwLock<Vec<StoredRegion>>,
}

impl InMemoryRegionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

#[async_trait]
impl RegionStore for InMemoryRegionStore {
    async fn persist(&self, regions: Vec<StoredRegion>) -> Result<(), StoreError> {
        self.rows.write().extend(regions);
        Ok(())
    }

    async fn by_message(&self, message_id: Uuid) -> Result<Vec<StoredRegion>, StoreError> {
        let mut out: Vec<StoredRegion> = self
            .rows
            .read()
            .iter()
            .filter(|r| r.message_id == message_id)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.start_offset);
        Ok(out)
    }

    async fn by_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<StoredRegion>, StoreError> {
        let mut out: Vec<StoredRegion> = self
            .rows
            .read()
            .iter()
            .filter(|r| r.conversation_id == conversation_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.detected_at
                .cmp(&b.detected_at)
                .then(a.start_offset.cmp(&b.start_offset))
        });
        Ok(out)
    }

    async fn by_user(&self, user_id: &str) -> Result<Vec<StoredRegion>, StoreError> {
        let mut out: Vec<StoredRegion> = self
            .rows
            .read()
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.detected_at
                .cmp(&b.detected_at)
                .then(a.start_offset.cmp(&b.start_offset))
        });
        Ok(out)
    }

    async fn query(&self, query: RegionQuery) -> Result<Vec<StoredRegion>, StoreError> {
        let mut out: Vec<StoredRegion> = self
            .rows
            .read()
            .iter()
            .filter(|r| {
                query
                    .conversation_id
                    .map_or(true, |c| r.conversation_id == c)
                    && query.kind.map_or(true, |k| r.kind == k)
                    && query.from.map_or(true, |f| r.detected_at >= f)
                    && query.to.map_or(true, |t| r.detected_at <= t)
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.detected_at
                .cmp(&b.detected_at)
                .then(a.start_offset.cmp(&b.start_offset))
        });
        Ok(out)
    }
}
