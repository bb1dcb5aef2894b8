//! Veil streaming redaction pipeline
//!
//! Streams assistant responses to chat clients while detecting and masking
//! sensitive data in near-real time. Content is forwarded the moment it
//! arrives; detection runs behind the stream on batches of buffered text and
//! publishes mask regions as separate events, so redaction latency never
//! shows up in visible text.
//!
//! # Pipeline shape
//!
//! - **Admission**: length, sanitization, rate, ownership, quota, and model
//!   gates run before anything is persisted or emitted.
//! - **Streaming**: model deltas are forwarded verbatim and accumulated in
//!   an append-only buffer with character-offset cursors.
//! - **Detection**: batches are cut from the undetected tail and scanned by
//!   an LLM-backed detector in fire-and-forget tasks with a per-dispatch
//!   deadline. Findings resolve to absolute character offsets and merge
//!   into one canonical, non-overlapping region set.
//! - **Finalization**: detection drains, both messages persist with token
//!   and cost accounting, regions and an audit record are written, and the
//!   stream closes with exactly one terminal event.
//!
//! All offsets crossing the wire are character offsets into the accumulated
//! assistant text, never byte offsets.

pub mod audit;
pub mod chat;
pub mod config;
pub mod error;
pub mod events;
pub mod limits;
pub mod models;
pub mod pii;
pub mod sanitize;
pub mod store;
pub mod stream;
pub mod telemetry;

use std::sync::Arc;

use audit::{AuditSink, InMemoryAuditSink};
use chat::ChatClient;
use config::PipelineConfig;
use limits::{InMemoryTokenTracker, TokenTracker};
use models::ModelCatalog;
use pii::{LlmPiiDetector, PiiDetector, PiiKind};
use store::{InMemoryMessageStore, InMemoryRegionStore, MessageStore, RegionStore};
use stream::StreamOrchestrator;

/// A fully wired pipeline instance backed by in-process storage.
///
/// The host supplies the chat transport; everything else is constructed
/// here. Server deployments that bring their own storage wire a
/// [`StreamOrchestrator`] directly instead.
pub struct Pipeline {
    pub config: PipelineConfig,
    pub catalog: Arc<ModelCatalog>,
    pub messages: Arc<InMemoryMessageStore>,
    pub regions: Arc<InMemoryRegionStore>,
    pub audit: Arc<InMemoryAuditSink>,
    pub tokens: Arc<InMemoryTokenTracker>,
    pub orchestrator: StreamOrchestrator,
}

impl Pipeline {
    /// Wire a pipeline whose detector runs on the same chat transport,
    /// using the detection model named in the configuration.
    pub fn new(config: PipelineConfig, chat: Arc<dyn ChatClient>) -> Self {
        let detector: Arc<dyn PiiDetector> = Arc::new(LlmPiiDetector::new(
            chat.clone(),
            config.detection.model.clone(),
            PiiKind::ALL.to_vec(),
        ));
        Self::with_detector(config, chat, detector)
    }

    /// Wire a pipeline around a caller-supplied detector.
    pub fn with_detector(
        config: PipelineConfig,
        chat: Arc<dyn ChatClient>,
        detector: Arc<dyn PiiDetector>,
    ) -> Self {
        let catalog = Arc::new(ModelCatalog::new());
        let messages = Arc::new(InMemoryMessageStore::new());
        let regions = Arc::new(InMemoryRegionStore::new());
        let audit = Arc::new(InMemoryAuditSink::new());
        let tokens = Arc::new(InMemoryTokenTracker::new());

        let orchestrator = StreamOrchestrator::new(
            config.clone(),
            catalog.clone(),
            chat,
            detector,
            messages.clone() as Arc<dyn MessageStore>,
            regions.clone() as Arc<dyn RegionStore>,
            audit.clone() as Arc<dyn AuditSink>,
            tokens.clone() as Arc<dyn TokenTracker>,
        );

        Self {
            config,
            catalog,
            messages,
            regions,
            audit,
            tokens,
            orchestrator,
        }
    }
}
