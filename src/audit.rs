//! Detection audit trail.
//!
//! Every completed stream leaves one [`DetectionRecord`] describing what
//! was scanned and what was found. Records never contain message text;
//! the content is represented only by its SHA-256 digest. Sink failures
//! are reported to the caller but must never fail the stream that
//! produced the record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::pii::{MaskRegion, PiiKind};
use crate::store::StoreError;

/// Counters accumulated over one stream's detection work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionStats {
    /// Batches handed to the detector.
    pub batches_dispatched: u64,
    /// Batches whose findings came back in time.
    pub batches_completed: u64,
    /// Batches abandoned at the per-dispatch deadline.
    pub batches_timed_out: u64,
    /// Batches that failed outright (transport, parse).
    pub batches_failed: u64,
    /// Raw findings reported by the detector.
    pub findings_reported: u64,
    /// Findings successfully located in the source text.
    pub findings_resolved: u64,
    /// Mask events actually put on the wire.
    pub regions_emitted: u64,
}

impl DetectionStats {
    pub fn has_failures(&self) -> bool {
        self.batches_timed_out > 0 || self.batches_failed > 0
    }
}

/// One masked span as recorded for audit, offsets in characters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedRegion {
    pub kind: PiiKind,
    pub start_offset: usize,
    pub end_offset: usize,
    /// Highest confidence among the detections merged into this span.
    pub confidence: f64,
}

impl RecordedRegion {
    pub fn from_region(region: &MaskRegion, confidence: f64) -> Self {
        Self {
            kind: region.kind,
            start_offset: region.start_offset,
            end_offset: region.end_offset,
            confidence,
        }
    }
}

/// Audit row for one streamed message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionRecord {
    /// Unique record identifier, 32 hex characters.
    pub id: String,
    pub recorded_at: DateTime<Utc>,
    pub conversation_id: Uuid,
    /// The message whose content was scanned.
    pub message_id: Uuid,
    pub user_id: String,
    /// Detection model that produced the findings.
    pub model: String,
    /// SHA-256 of the scanned text. The text itself is never stored.
    pub content_hash: String,
    /// Length of the scanned text in characters.
    pub content_chars: usize,
    /// Final merged regions, in offset order.
    pub regions: Vec<RecordedRegion>,
    pub stats: DetectionStats,
}

impl DetectionRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        conversation_id: Uuid,
        message_id: Uuid,
        user_id: impl Into<String>,
        model: impl Into<String>,
        content: &str,
        regions: Vec<RecordedRegion>,
        stats: DetectionStats,
    ) -> Self {
        Self {
            id: generate_record_id(),
            recorded_at: Utc::now(),
            conversation_id,
            message_id,
            user_id: user_id.into(),
            model: model.into(),
            content_hash: content_hash(content),
            content_chars: content.chars().count(),
            regions,
            stats,
        }
    }
}

/// SHA-256 digest of a text, lowercase hex.
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

fn generate_record_id() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes[..]);
    hex::encode(bytes)
}

/// Destination for detection records.
#[async_trait::async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: DetectionRecord) -> Result<(), StoreError>;
}

/// Bounded in-process sink backing tests and the demo binary.
pub struct InMemoryAuditSink {
    max_records: usize,
    records: RwLock<Vec<DetectionRecord>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(max_records: usize) -> Self {
        Self {
            max_records: max_records.max(1),
            records: RwLock::new(Vec::new()),
        }
    }

    pub async fn records(&self) -> Vec<DetectionRecord> {
        self.records.read().await.clone()
    }

    pub async fn by_conversation(&self, conversation_id: Uuid) -> Vec<DetectionRecord> {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| r.conversation_id == conversation_id)
            .cloned()
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn export_json(&self) -> Result<String, serde_json::Error> {
        let records = self.records.read().await;
        serde_json::to_string_pretty(&*records)
    }
}

impl Default for InMemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, record: DetectionRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        records.push(record);
        if records.len() > self.max_records {
            let excess = records.len() - self.max_records;
            records.drain(0..excess);
        }
        Ok(())
    }
}
