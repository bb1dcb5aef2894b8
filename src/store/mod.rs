//! Persistence collaborators consumed by the pipeline.
//!
//! The pipeline owns no database. It talks to two narrow interfaces: a
//! position-ordered, append-only [`MessageStore`] and a [`RegionStore`] for
//! durable mask-region rows. The host application backs these with its real
//! storage; the in-memory implementations in [`memory`] back tests and the
//! demo binary.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::chat::ChatMessage;
use crate::pii::PiiKind;

/// Storage failure. Mapped to the request taxonomy at the call site.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("store operation failed: {0}")]
    Operation(String),
}

/// Role of a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Summary of a conversation, as needed by the pre-stream gate.
#[derive(Debug, Clone)]
pub struct ConversationInfo {
    pub id: Uuid,
    pub user_id: String,
    pub message_count: usize,
    pub model_id: Option<String>,
}

/// Payload for one message insert.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub token_count: u32,
    pub model_id: Option<String>,
    /// Cost of producing this message, micro-USD.
    pub cost_micro: Option<u64>,
    pub position: u32,
    /// Per-1M input token cost in effect at write time, micro-USD.
    pub input_cost_snapshot_micro: Option<u64>,
    /// Per-1M output token cost in effect at write time, micro-USD.
    pub output_cost_snapshot_micro: Option<u64>,
}

impl NewMessage {
    /// A user message carries no cost or model attribution.
    pub fn user(conversation_id: Uuid, content: String, position: u32) -> Self {
        Self {
            conversation_id,
            role: MessageRole::User,
            content,
            token_count: 0,
            model_id: None,
            cost_micro: None,
            position,
            input_cost_snapshot_micro: None,
            output_cost_snapshot_micro: None,
        }
    }
}

/// Identity of a freshly inserted message.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Append-only, position-ordered message storage.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Look up a conversation; `None` when it does not exist.
    async fn find_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<ConversationInfo>, StoreError>;

    /// The last `limit` non-deleted messages, oldest first, as a chat
    /// transcript.
    async fn context_messages(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, StoreError>;

    /// Next free position in the conversation.
    async fn next_position(&self, conversation_id: Uuid) -> Result<u32, StoreError>;

    async fn create_message(&self, message: NewMessage) -> Result<StoredMessage, StoreError>;

    async fn update_token_count(
        &self,
        message_id: Uuid,
        token_count: u32,
    ) -> Result<(), StoreError>;

    /// Mark a message deleted without destroying the row. Used as the
    /// compensating action when a stream fails before the assistant
    /// message exists.
    async fn soft_delete(&self, message_id: Uuid) -> Result<(), StoreError>;
}

/// One durable mask-region row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRegion {
    pub id: String,
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub user_id: String,
    pub kind: PiiKind,
    pub start_offset: usize,
    pub end_offset: usize,
    pub confidence: f64,
    pub detected_at: DateTime<Utc>,
}

/// Filters for region queries.
#[derive(Debug, Clone, Default)]
pub struct RegionQuery {
    pub conversation_id: Option<Uuid>,
    pub kind: Option<PiiKind>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Durable mask-region storage, append-only, queryable for UI replay.
#[async_trait]
pub trait RegionStore: Send + Sync {
    async fn persist(&self, regions: Vec<StoredRegion>) -> Result<(), StoreError>;

    async fn by_message(&self, message_id: Uuid) -> Result<Vec<StoredRegion>, StoreError>;

    async fn by_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<StoredRegion>, StoreError>;

    async fn by_user(&self, user_id: &str) -> Result<Vec<StoredRegion>, StoreError>;

    async fn query(&self, query: RegionQuery) -> Result<Vec<StoredRegion>, StoreError>;
}

pub use memory::{InMemoryMessageStore, InMemoryRegionStore};
