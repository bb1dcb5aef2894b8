//! Stream orchestration: admission, delta forwarding, detection dispatch,
//! drain, and finalization.
//!
//! One call to [`StreamOrchestrator::start_stream`] runs the entire
//! exchange. The request is gated before anything is persisted or
//! emitted; once admitted, the user message is written and a background
//! task owns the rest of the lifecycle. Content deltas are forwarded the
//! moment they arrive and detection works behind the stream on batches,
//! so masking latency never shows up in visible text. The task drains
//! detection, persists the assistant message and regions, and closes the
//! stream with exactly one terminal event.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument, Span};
use uuid::Uuid;

use crate::audit::{AuditSink, DetectionRecord, DetectionStats, RecordedRegion};
use crate::chat::{
    estimate_tokens, ChatClient, ChatDelta, ChatError, ChatMessage, ChatRequest, ChatUsage,
};
use crate::config::{FallbackMode, PipelineConfig};
use crate::error::StreamError;
use crate::events::StreamEvent;
use crate::limits::{RateLimiter, TokenTracker};
use crate::models::{ModelCatalog, ModelInfo};
use crate::pii::{
    detect_with_timeout, resolve_offsets, DetectorError, MaskRegionSet, MergeOutcome, PiiDetector,
    ResolvedDetection,
};
use crate::sanitize::sanitize_input;
use crate::store::{MessageRole, MessageStore, NewMessage, RegionStore, StoredRegion};
use crate::stream::batch::extract_batches;
use crate::stream::buffer::{Cursor, StreamBuffer};
use crate::stream::channel::{EventSender, EventStream};
use crate::stream::tasks::DetectionTasks;
use crate::telemetry::{
    record_detection_completed, record_detection_dispatch, record_detection_failure,
    record_detection_timeout, record_findings_dropped, record_mask_emitted,
    record_stream_failure, record_stream_success, DetectionSpan, StreamSpan,
};

const EVENT_BUFFER: usize = 256;

/// Inbound request for one streamed exchange.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub user_id: String,
    pub conversation_id: Uuid,
    pub message: String,
    /// Explicit model choice; `None` falls through to the conversation
    /// default, then the global default.
    pub model: Option<String>,
}

/// Live handle to a running stream.
#[derive(Debug)]
pub struct StreamHandle {
    /// Identity of the persisted user message.
    pub user_message_id: Uuid,
    events: EventStream,
    cancel: CancellationToken,
}

impl StreamHandle {
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.next().await
    }

    /// Collect events until the terminal event or channel close.
    pub async fn collect(self) -> Vec<StreamEvent> {
        self.events.collect().await
    }

    /// Abort the stream as a client disconnect would.
    pub fn disconnect(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Everything the background task needs about an admitted request.
struct StreamSetup {
    request_id: String,
    user_id: String,
    conversation_id: Uuid,
    user_message_id: Uuid,
    assistant_position: u32,
    model: ModelInfo,
}

/// State shared between the delta loop and in-flight detection tasks.
struct DetectionState {
    regions: MaskRegionSet,
    resolved: Vec<ResolvedDetection>,
    stats: DetectionStats,
    /// Set when a batch failed and the fallback mode is `Fail`.
    failed: bool,
}

impl DetectionState {
    fn new() -> Self {
        Self {
            regions: MaskRegionSet::new(),
            resolved: Vec::new(),
            stats: DetectionStats::default(),
            failed: false,
        }
    }
}

/// How a stream task ended.
enum StreamEnd {
    Done {
        total_tokens: u32,
        masks_emitted: u64,
    },
    Disconnected {
        assistant_created: bool,
    },
    Failed {
        error: StreamError,
        assistant_created: bool,
    },
}

/// Output of the admission gate: the cleaned message and the resolved model.
struct Admission {
    sanitized: String,
    model: ModelInfo,
}

/// Coordinates one streamed exchange end to end.
#[derive(Clone)]
pub struct StreamOrchestrator {
    config: PipelineConfig,
    catalog: Arc<ModelCatalog>,
    chat: Arc<dyn ChatClient>,
    detector: Arc<dyn PiiDetector>,
    messages: Arc<dyn MessageStore>,
    regions: Arc<dyn RegionStore>,
    audit: Arc<dyn AuditSink>,
    tokens: Arc<dyn TokenTracker>,
    limiter: Arc<RateLimiter>,
}

impl StreamOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: PipelineConfig,
        catalog: Arc<ModelCatalog>,
        chat: Arc<dyn ChatClient>,
        detector: Arc<dyn PiiDetector>,
        messages: Arc<dyn MessageStore>,
        regions: Arc<dyn RegionStore>,
        audit: Arc<dyn AuditSink>,
        tokens: Arc<dyn TokenTracker>,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::per_minute(config.chat.requests_per_minute));
        Self {
            config,
            catalog,
            chat,
            detector,
            messages,
            regions,
            audit,
            tokens,
            limiter,
        }
    }

    /// Gate, persist the user message, and launch the stream.
    ///
    /// Errors returned here mean nothing was emitted and nothing needs
    /// cleanup beyond what the error says. After `Ok`, the handle's
    /// event stream carries the rest of the exchange, ending in exactly
    /// one `done` or `error` event unless the client disconnects first.
    pub async fn start_stream(&self, request: StreamRequest) -> Result<StreamHandle, StreamError> {
        let admission = self.admit(&request).await?;
        let position = self.messages.next_position(request.conversation_id).await?;
        let user_message = self
            .messages
            .create_message(NewMessage::user(
                request.conversation_id,
                admission.sanitized,
                position,
            ))
            .await?;

        let request_id = Uuid::new_v4().to_string();
        info!(
            request_id = %request_id,
            conversation_id = %request.conversation_id,
            model_id = %admission.model.id,
            "stream admitted"
        );

        let setup = StreamSetup {
            request_id: request_id.clone(),
            user_id: request.user_id,
            conversation_id: request.conversation_id,
            user_message_id: user_message.id,
            assistant_position: position + 1,
            model: admission.model,
        };
        let span = StreamSpan::new(
            &request_id,
            &setup.conversation_id.to_string(),
            &setup.model.id,
        );

        let (sender, events) = EventStream::new(EVENT_BUFFER);
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let this = self.clone();
        tokio::spawn(
            async move { this.run_stream(sender, task_cancel, setup).await }.instrument(span),
        );

        Ok(StreamHandle {
            user_message_id: user_message.id,
            events,
            cancel,
        })
    }

    /// The pre-stream gate. Rejects without side effects.
    async fn admit(&self, request: &StreamRequest) -> Result<Admission, StreamError> {
        let limits = &self.config.chat;

        let raw_chars = request.message.chars().count();
        if raw_chars == 0 || raw_chars > limits.max_message_chars {
            return Err(StreamError::Validation(format!(
                "message must be between 1 and {} characters",
                limits.max_message_chars
            )));
        }
        let sanitized = sanitize_input(&request.message);
        if sanitized.is_empty() {
            return Err(StreamError::Validation("message cannot be empty".to_string()));
        }

        let decision = self.limiter.check(&request.user_id);
        if !decision.allowed {
            return Err(StreamError::RateLimited {
                retry_after_secs: decision.retry_after_secs,
            });
        }

        let conversation = self
            .messages
            .find_conversation(request.conversation_id)
            .await?
            .ok_or_else(|| {
                StreamError::NotFound(format!("conversation {}", request.conversation_id))
            })?;
        if conversation.user_id != request.user_id {
            return Err(StreamError::Forbidden(
                "conversation belongs to another user".to_string(),
            ));
        }
        if conversation.message_count >= limits.max_messages_per_conversation {
            return Err(StreamError::Validation(
                "conversation has reached the message limit".to_string(),
            ));
        }

        let used = self.tokens.daily_usage(&request.user_id).await?;
        if used >= limits.daily_token_limit {
            return Err(StreamError::QuotaExceeded(format!(
                "{used} of {} tokens used today",
                limits.daily_token_limit
            )));
        }

        let model = self
            .catalog
            .resolve(request.model.as_deref(), conversation.model_id.as_deref())
            .ok_or_else(|| StreamError::Validation("unsupported model".to_string()))?
            .clone();

        Ok(Admission { sanitized, model })
    }

    async fn run_stream(
        self,
        sender: EventSender,
        cancel: CancellationToken,
        setup: StreamSetup,
    ) {
        let started = Instant::now();
        let end = self.stream_exchange(&sender, &cancel, &setup).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        let span = Span::current();
        span.record("latency_ms", latency_ms);

        match end {
            StreamEnd::Done {
                total_tokens,
                masks_emitted,
            } => {
                span.record("status", "ok");
                span.record("total_tokens", u64::from(total_tokens));
                span.record("masks_emitted", masks_emitted);
                record_stream_success(latency_ms, u64::from(total_tokens));
                info!(total_tokens, masks_emitted, "stream completed");
            }
            StreamEnd::Disconnected { assistant_created } => {
                span.record("status", "cancelled");
                record_stream_failure("cancelled");
                if !assistant_created {
                    self.rollback_user_message(setup.user_message_id).await;
                }
                info!("stream cancelled by client");
            }
            StreamEnd::Failed {
                error,
                assistant_created,
            } => {
                span.record("status", "error");
                span.record("error.message", error.to_string().as_str());
                record_stream_failure(error.kind());
                warn!(kind = error.kind(), error = %error, "stream failed");
                if !assistant_created {
                    self.rollback_user_message(setup.user_message_id).await;
                }
                let _ = sender
                    .send(StreamEvent::Error {
                        error: error.client_message().to_string(),
                    })
                    .await;
            }
        }
    }

    /// Remove the user message after a stream died before its assistant
    /// reply existed.
    async fn rollback_user_message(&self, user_message_id: Uuid) {
        if let Err(e) = self.messages.soft_delete(user_message_id).await {
            warn!(message_id = %user_message_id, error = %e, "failed to roll back user message");
        }
    }

    async fn stream_exchange(
        &self,
        sender: &EventSender,
        cancel: &CancellationToken,
        setup: &StreamSetup,
    ) -> StreamEnd {
        let detection_on = self.config.detection.enabled;
        let fail_hard = self.config.detection.fallback == FallbackMode::Fail;

        let context = match self
            .messages
            .context_messages(setup.conversation_id, self.config.chat.context_window)
            .await
        {
            Ok(context) => context,
            Err(e) => {
                return StreamEnd::Failed {
                    error: e.into(),
                    assistant_created: false,
                }
            }
        };
        let prompt_estimate = estimate_tokens(&context);

        let request = ChatRequest::new(setup.model.id.clone(), context);
        let mut deltas = match self.chat.stream_completion(request).await {
            Ok(deltas) => deltas,
            Err(e) => {
                return StreamEnd::Failed {
                    error: e.into(),
                    assistant_created: false,
                }
            }
        };

        let shared = Arc::new(Mutex::new(DetectionState::new()));
        let mut tasks = DetectionTasks::new();
        let mut buffer = StreamBuffer::new();
        let mut dispatched = Cursor::default();
        let mut deltas_seen: usize = 0;
        let mut usage: Option<ChatUsage> = None;

        debug!("streaming deltas");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("client disconnected mid-stream");
                    return StreamEnd::Disconnected { assistant_created: false };
                }
                delta = deltas.next() => match delta {
                    Some(Ok(ChatDelta::Content(text))) => {
                        if text.is_empty() {
                            continue;
                        }
                        // Forward before any detection work; masking must
                        // never delay visible text.
                        if sender.send(StreamEvent::content(text.clone())).await.is_err() {
                            return StreamEnd::Disconnected { assistant_created: false };
                        }
                        buffer.append(&text);
                        deltas_seen += 1;
                        if detection_on && deltas_seen % self.config.detection.batch_deltas == 0 {
                            self.dispatch_ready_batches(
                                &mut tasks, &shared, sender, setup, &buffer, &mut dispatched, false,
                            );
                        }
                        if detection_on && fail_hard && shared.lock().failed {
                            return StreamEnd::Failed {
                                error: StreamError::Detection(
                                    "a detection batch did not complete".to_string(),
                                ),
                                assistant_created: false,
                            };
                        }
                    }
                    Some(Ok(ChatDelta::Usage(reported))) => {
                        usage = Some(reported);
                    }
                    Some(Err(e)) => {
                        return StreamEnd::Failed {
                            error: e.into(),
                            assistant_created: false,
                        };
                    }
                    None => break,
                }
            }
        }

        if detection_on {
            // Whatever is left gets scanned even when under budget.
            self.dispatch_ready_batches(
                &mut tasks, &shared, sender, setup, &buffer, &mut dispatched, true,
            );
            debug!(in_flight = tasks.len(), "draining detection tasks");
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("client disconnected during drain");
                    return StreamEnd::Disconnected { assistant_created: false };
                }
                () = tasks.join_all() => {}
            }
            if fail_hard && shared.lock().failed {
                return StreamEnd::Failed {
                    error: StreamError::Detection(
                        "a detection batch did not complete".to_string(),
                    ),
                    assistant_created: false,
                };
            }
        }

        self.finalize(
            sender,
            setup,
            buffer.into_string(),
            usage,
            prompt_estimate,
            &shared,
            detection_on,
        )
        .await
    }

    /// Cut ready batches out of the undetected tail and fire a task for
    /// each. Without `force`, a tail within budget is left for later.
    #[allow(clippy::too_many_arguments)]
    fn dispatch_ready_batches(
        &self,
        tasks: &mut DetectionTasks,
        shared: &Arc<Mutex<DetectionState>>,
        sender: &EventSender,
        setup: &StreamSetup,
        buffer: &StreamBuffer,
        dispatched: &mut Cursor,
        force: bool,
    ) {
        let max = self.config.detection.max_batch_chars;
        let (pending, _) = buffer.appended_since(*dispatched);
        if pending.is_empty() {
            return;
        }
        if !force && pending.chars().count() <= max {
            return;
        }

        let extraction = extract_batches(pending, max);
        for batch in extraction.batches {
            let base_offset = dispatched.offset();
            dispatched.advance(&batch);
            self.spawn_detection(tasks, shared, sender, setup, batch, base_offset);
        }
        if force && !extraction.remaining.is_empty() {
            let base_offset = dispatched.offset();
            dispatched.advance(&extraction.remaining);
            self.spawn_detection(tasks, shared, sender, setup, extraction.remaining, base_offset);
        }
    }

    fn spawn_detection(
        &self,
        tasks: &mut DetectionTasks,
        shared: &Arc<Mutex<DetectionState>>,
        sender: &EventSender,
        setup: &StreamSetup,
        batch: String,
        base_offset: usize,
    ) {
        let batch_index = {
            let mut guard = shared.lock();
            let index = guard.stats.batches_dispatched;
            guard.stats.batches_dispatched += 1;
            index
        };
        record_detection_dispatch();

        let span = DetectionSpan::new(&setup.request_id, batch_index, batch.chars().count());
        let detector = Arc::clone(&self.detector);
        let shared = Arc::clone(shared);
        let tx = sender.clone();
        let timeout_ms = self.config.detection.timeout.as_millis() as u64;
        let min_confidence = self.config.detection.min_confidence;
        let fail_hard = self.config.detection.fallback == FallbackMode::Fail;

        tasks.spawn(
            async move {
                let started = Instant::now();
                let result = detect_with_timeout(detector.as_ref(), &batch, timeout_ms).await;
                let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                let span = Span::current();
                span.record("latency_ms", latency_ms);

                match result {
                    Ok(findings) => {
                        span.record("status", "ok");
                        span.record("findings", findings.len() as u64);
                        record_detection_completed(latency_ms);

                        let reported = findings.len() as u64;
                        let to_emit = {
                            let mut guard = shared.lock();
                            guard.stats.batches_completed += 1;
                            guard.stats.findings_reported += reported;

                            let located = resolve_offsets(&batch, base_offset, &findings);
                            let mut kept = 0u64;
                            let mut to_emit = Vec::new();
                            for detection in located {
                                if detection.confidence < min_confidence {
                                    debug!(
                                        kind = %detection.kind,
                                        confidence = detection.confidence,
                                        "finding below confidence floor, dropping"
                                    );
                                    continue;
                                }
                                kept += 1;
                                guard.stats.findings_resolved += 1;
                                if let MergeOutcome::Updated(region) =
                                    guard.regions.insert_detection(&detection)
                                {
                                    guard.stats.regions_emitted += 1;
                                    record_mask_emitted(region.kind.as_str());
                                    to_emit.push(region);
                                }
                                guard.resolved.push(detection);
                            }
                            if kept < reported {
                                record_findings_dropped(reported - kept);
                            }
                            to_emit
                        };
                        for region in to_emit {
                            // Consumer may already be gone; masks are advisory.
                            let _ = tx.send(StreamEvent::PiiMask { region }).await;
                        }
                    }
                    Err(DetectorError::Timeout(ms)) => {
                        span.record("status", "error");
                        span.record("error.message", "timeout");
                        record_detection_timeout();
                        {
                            let mut guard = shared.lock();
                            guard.stats.batches_timed_out += 1;
                            if fail_hard {
                                guard.failed = true;
                            }
                        }
                        warn!(batch_index, timeout_ms = ms, "detection batch timed out");
                    }
                    Err(e) => {
                        span.record("status", "error");
                        span.record("error.message", e.to_string().as_str());
                        record_detection_failure();
                        {
                            let mut guard = shared.lock();
                            guard.stats.batches_failed += 1;
                            if fail_hard {
                                guard.failed = true;
                            }
                        }
                        warn!(batch_index, error = %e, "detection batch failed");
                    }
                }
            }
            .instrument(span),
        );
    }

    #[allow(clippy::too_many_arguments)]
    async fn finalize(
        &self,
        sender: &EventSender,
        setup: &StreamSetup,
        full_text: String,
        usage: Option<ChatUsage>,
        prompt_estimate: u32,
        shared: &Arc<Mutex<DetectionState>>,
        detection_on: bool,
    ) -> StreamEnd {
        if full_text.is_empty() {
            return StreamEnd::Failed {
                error: StreamError::Chat(ChatError::Completion(
                    "provider returned no content".to_string(),
                )),
                assistant_created: false,
            };
        }

        let (prompt_tokens, completion_tokens) = match usage {
            Some(reported) if !reported.is_empty() => {
                (reported.prompt_tokens, reported.completion_tokens)
            }
            _ => (
                prompt_estimate,
                estimate_tokens(&[ChatMessage::assistant(full_text.clone())]),
            ),
        };
        let total_tokens = prompt_tokens.saturating_add(completion_tokens);
        let cost_micro = setup.model.cost_micro(prompt_tokens, completion_tokens);

        let assistant_message = match self
            .messages
            .create_message(NewMessage {
                conversation_id: setup.conversation_id,
                role: MessageRole::Assistant,
                content: full_text.clone(),
                token_count: completion_tokens,
                model_id: Some(setup.model.id.clone()),
                cost_micro: Some(cost_micro),
                position: setup.assistant_position,
                input_cost_snapshot_micro: Some(setup.model.input_cost_per_1m_micro),
                output_cost_snapshot_micro: Some(setup.model.output_cost_per_1m_micro),
            })
            .await
        {
            Ok(stored) => stored,
            Err(e) => {
                return StreamEnd::Failed {
                    error: e.into(),
                    assistant_created: false,
                }
            }
        };

        if let Err(e) = self
            .messages
            .update_token_count(setup.user_message_id, prompt_tokens)
            .await
        {
            return StreamEnd::Failed {
                error: e.into(),
                assistant_created: true,
            };
        }
        if let Err(e) = self
            .tokens
            .record_usage(&setup.user_id, u64::from(total_tokens))
            .await
        {
            return StreamEnd::Failed {
                error: e.into(),
                assistant_created: true,
            };
        }

        let masks_emitted = if detection_on {
            self.persist_detection(setup, assistant_message.id, &full_text, shared)
                .await
        } else {
            0
        };

        let done = StreamEvent::Done {
            user_message_id: setup.user_message_id.to_string(),
            assistant_message_id: assistant_message.id.to_string(),
            total_tokens,
            model: Some(setup.model.id.clone()),
        };
        if sender.send(done).await.is_err() {
            return StreamEnd::Disconnected {
                assistant_created: true,
            };
        }

        StreamEnd::Done {
            total_tokens,
            masks_emitted,
        }
    }

    /// Write region rows and the audit record. Neither failure is
    /// allowed to fail the stream.
    async fn persist_detection(
        &self,
        setup: &StreamSetup,
        assistant_message_id: Uuid,
        full_text: &str,
        shared: &Arc<Mutex<DetectionState>>,
    ) -> u64 {
        let (regions, resolved, stats) = {
            let guard = shared.lock();
            (
                guard.regions.as_slice().to_vec(),
                guard.resolved.clone(),
                guard.stats,
            )
        };

        let recorded: Vec<RecordedRegion> = regions
            .iter()
            .map(|region| {
                let confidence = resolved
                    .iter()
                    .filter(|d| {
                        d.start_offset < region.end_offset && d.end_offset > region.start_offset
                    })
                    .map(|d| d.confidence)
                    .fold(0.0_f64, f64::max);
                RecordedRegion::from_region(region, confidence)
            })
            .collect();

        if !recorded.is_empty() {
            let rows: Vec<StoredRegion> = recorded
                .iter()
                .map(|r| StoredRegion {
                    id: Uuid::new_v4().to_string(),
                    message_id: assistant_message_id,
                    conversation_id: setup.conversation_id,
                    user_id: setup.user_id.clone(),
                    kind: r.kind,
                    start_offset: r.start_offset,
                    end_offset: r.end_offset,
                    confidence: r.confidence,
                    detected_at: Utc::now(),
                })
                .collect();
            if let Err(e) = self.regions.persist(rows).await {
                warn!(error = %e, "failed to persist mask regions");
            }
        }

        let record = DetectionRecord::new(
            setup.conversation_id,
            assistant_message_id,
            setup.user_id.clone(),
            self.config.detection.model.clone(),
            full_text,
            recorded,
            stats,
        );
        if let Err(e) = self.audit.record(record).await {
            warn!(error = %e, "failed to write detection audit record");
        }

        stats.regions_emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream;

    use crate::audit::InMemoryAuditSink;
    use crate::chat::{ChatCompletion, DeltaStream};
    use crate::limits::InMemoryTokenTracker;
    use crate::pii::{PiiFinding, PiiKind};
    use crate::store::{InMemoryMessageStore, InMemoryRegionStore};

    struct ScriptedChat {
        deltas: Vec<Result<ChatDelta, ChatError>>,
    }

    impl ScriptedChat {
        fn content(parts: &[&str]) -> Self {
            Self {
                deltas: parts
                    .iter()
                    .map(|p| Ok(ChatDelta::Content(p.to_string())))
                    .collect(),
            }
        }

        fn with_usage(mut self, usage: ChatUsage) -> Self {
            self.deltas.push(Ok(ChatDelta::Usage(usage)));
            self
        }

        fn then_error(mut self, error: ChatError) -> Self {
            self.deltas.push(Err(error));
            self
        }

        fn silent() -> Self {
            Self { deltas: Vec::new() }
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedChat {
        async fn stream_completion(&self, _request: ChatRequest) -> Result<DeltaStream, ChatError> {
            let deltas: Vec<Result<ChatDelta, ChatError>> = self
                .deltas
                .iter()
                .map(|d| match d {
                    Ok(delta) => Ok(delta.clone()),
                    Err(e) => Err(ChatError::Stream(e.to_string())),
                })
                .collect();
            Ok(stream::iter(deltas).boxed())
        }

        async fn complete(&self, _request: ChatRequest) -> Result<ChatCompletion, ChatError> {
            Err(ChatError::Completion("not scripted".to_string()))
        }
    }

    /// A stream that never produces anything, for disconnect tests.
    struct HungChat;

    #[async_trait]
    impl ChatClient for HungChat {
        async fn stream_completion(&self, _request: ChatRequest) -> Result<DeltaStream, ChatError> {
            Ok(stream::pending().boxed())
        }

        async fn complete(&self, _request: ChatRequest) -> Result<ChatCompletion, ChatError> {
            Err(ChatError::Completion("not scripted".to_string()))
        }
    }

    /// Flags any occurrence of a fixed email address.
    struct EmailDetector;

    #[async_trait]
    impl PiiDetector for EmailDetector {
        async fn detect(&self, text: &str) -> Result<Vec<PiiFinding>, DetectorError> {
            if text.contains("alice@example.com") {
                Ok(vec![PiiFinding::with_confidence(
                    PiiKind::Email,
                    "alice@example.com",
                    0.97,
                )])
            } else {
                Ok(Vec::new())
            }
        }
    }

    struct FailingDetector;

    #[async_trait]
    impl PiiDetector for FailingDetector {
        async fn detect(&self, _text: &str) -> Result<Vec<PiiFinding>, DetectorError> {
            Err(DetectorError::Transport("connection refused".to_string()))
        }
    }

    struct Harness {
        orchestrator: StreamOrchestrator,
        messages: Arc<InMemoryMessageStore>,
        regions: Arc<InMemoryRegionStore>,
        audit: Arc<InMemoryAuditSink>,
        tokens: Arc<InMemoryTokenTracker>,
        conversation_id: Uuid,
    }

    fn harness(
        config: PipelineConfig,
        chat: Arc<dyn ChatClient>,
        detector: Arc<dyn PiiDetector>,
    ) -> Harness {
        let messages = Arc::new(InMemoryMessageStore::new());
        let regions = Arc::new(InMemoryRegionStore::new());
        let audit = Arc::new(InMemoryAuditSink::new());
        let tokens = Arc::new(InMemoryTokenTracker::new());
        let conversation_id = messages.create_conversation("user-1", None);
        let orchestrator = StreamOrchestrator::new(
            config,
            Arc::new(ModelCatalog::new()),
            chat,
            detector,
            messages.clone(),
            regions.clone(),
            audit.clone(),
            tokens.clone(),
        );
        Harness {
            orchestrator,
            messages,
            regions,
            audit,
            tokens,
            conversation_id,
        }
    }

    fn request(h: &Harness, message: &str) -> StreamRequest {
        StreamRequest {
            user_id: "user-1".to_string(),
            conversation_id: h.conversation_id,
            message: message.to_string(),
            model: None,
        }
    }

    fn detection_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.detection.enabled = true;
        config.detection.batch_deltas = 1;
        config
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let h = harness(
            PipelineConfig::default(),
            Arc::new(ScriptedChat::silent()),
            Arc::new(EmailDetector),
        );
        let err = h
            .orchestrator
            .start_stream(request(&h, "  <p></p>  "))
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::Validation(_)));
    }

    #[tokio::test]
    async fn overlong_message_is_rejected() {
        let h = harness(
            PipelineConfig::default(),
            Arc::new(ScriptedChat::silent()),
            Arc::new(EmailDetector),
        );
        let long = "x".repeat(4001);
        let err = h
            .orchestrator
            .start_stream(request(&h, &long))
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::Validation(_)));
    }

    #[tokio::test]
    async fn unknown_conversation_is_rejected() {
        let h = harness(
            PipelineConfig::default(),
            Arc::new(ScriptedChat::silent()),
            Arc::new(EmailDetector),
        );
        let mut req = request(&h, "hello");
        req.conversation_id = Uuid::new_v4();
        let err = h.orchestrator.start_stream(req).await.unwrap_err();
        assert!(matches!(err, StreamError::NotFound(_)));
    }

    #[tokio::test]
    async fn foreign_conversation_is_forbidden() {
        let h = harness(
            PipelineConfig::default(),
            Arc::new(ScriptedChat::silent()),
            Arc::new(EmailDetector),
        );
        let mut req = request(&h, "hello");
        req.user_id = "intruder".to_string();
        let err = h.orchestrator.start_stream(req).await.unwrap_err();
        assert!(matches!(err, StreamError::Forbidden(_)));
    }

    #[tokio::test]
    async fn rate_limit_applies_per_user() {
        let mut config = PipelineConfig::default();
        config.chat.requests_per_minute = 1;
        let h = harness(
            config,
            Arc::new(ScriptedChat::content(&["hi"])),
            Arc::new(EmailDetector),
        );

        let first = h.orchestrator.start_stream(request(&h, "one")).await;
        assert!(first.is_ok());
        let err = h
            .orchestrator
            .start_stream(request(&h, "two"))
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::RateLimited { .. }));
        first.unwrap().collect().await;
    }

    #[tokio::test]
    async fn exhausted_quota_is_rejected() {
        let h = harness(
            PipelineConfig::default(),
            Arc::new(ScriptedChat::silent()),
            Arc::new(EmailDetector),
        );
        h.tokens.set_usage("user-1", 50_000);
        let err = h
            .orchestrator
            .start_stream(request(&h, "hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::QuotaExceeded(_)));
    }

    #[tokio::test]
    async fn unsupported_model_is_rejected() {
        let h = harness(
            PipelineConfig::default(),
            Arc::new(ScriptedChat::silent()),
            Arc::new(EmailDetector),
        );
        let mut req = request(&h, "hello");
        req.model = Some("made-up/model".to_string());
        let err = h.orchestrator.start_stream(req).await.unwrap_err();
        assert!(matches!(err, StreamError::Validation(_)));
        // The gate rejected before any write.
        assert!(h.messages.messages_in(h.conversation_id).is_empty());
    }

    #[tokio::test]
    async fn happy_path_without_detection() {
        let chat = ScriptedChat::content(&["Hello", ", ", "world!"]).with_usage(ChatUsage {
            prompt_tokens: 12,
            completion_tokens: 4,
            total_tokens: 16,
        });
        let h = harness(
            PipelineConfig::default(),
            Arc::new(chat),
            Arc::new(EmailDetector),
        );

        let handle = h
            .orchestrator
            .start_stream(request(&h, "say hello"))
            .await
            .unwrap();
        let user_message_id = handle.user_message_id;
        let events = handle.collect().await;

        let texts: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Content { content } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["Hello", ", ", "world!"]);

        let StreamEvent::Done {
            user_message_id: done_user,
            assistant_message_id,
            total_tokens,
            model,
        } = events.last().unwrap()
        else {
            panic!("expected done event, got {:?}", events.last());
        };
        assert_eq!(done_user, &user_message_id.to_string());
        assert_eq!(*total_tokens, 16);
        assert_eq!(model.as_deref(), Some("openai/gpt-5-mini"));

        let rows = h.messages.messages_in(h.conversation_id);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].content, "say hello");
        assert_eq!(rows[0].token_count, 12);
        assert_eq!(rows[1].content, "Hello, world!");
        assert_eq!(rows[1].token_count, 4);
        assert_eq!(rows[1].id.to_string(), *assistant_message_id);
        assert!(rows[1].cost_micro.is_some());

        assert_eq!(h.tokens.daily_usage("user-1").await.unwrap(), 16);
        // Detection disabled: no audit trail, no regions.
        assert_eq!(h.audit.count().await, 0);
        assert!(h.regions.is_empty());
    }

    #[tokio::test]
    async fn detection_masks_and_audits() {
        let chat = ScriptedChat::content(&["My contact is ", "alice@example.com", " thanks"]);
        let h = harness(detection_config(), Arc::new(chat), Arc::new(EmailDetector));

        let handle = h
            .orchestrator
            .start_stream(request(&h, "what is your email?"))
            .await
            .unwrap();
        let events = handle.collect().await;

        let masks: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::PiiMask { region } => Some(region.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(masks.len(), 1);
        assert_eq!(masks[0].start_offset, 14);
        assert_eq!(masks[0].end_offset, 31);
        assert_eq!(masks[0].kind, PiiKind::Email);
        assert_eq!(masks[0].original_length, 17);
        assert!(events.last().unwrap().is_terminal());

        let rows = h.regions.by_conversation(h.conversation_id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].start_offset, 14);
        assert_eq!(rows[0].end_offset, 31);
        assert!((rows[0].confidence - 0.97).abs() < 1e-9);

        let records = h.audit.by_conversation(h.conversation_id).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].stats.regions_emitted, 1);
        assert_eq!(records[0].regions.len(), 1);
        assert_eq!(records[0].content_chars, "My contact is alice@example.com thanks".chars().count());
    }

    #[tokio::test]
    async fn detector_failure_degrades_to_unmasked_stream() {
        let chat = ScriptedChat::content(&["Reach me at alice@example.com today"]);
        let h = harness(detection_config(), Arc::new(chat), Arc::new(FailingDetector));

        let handle = h
            .orchestrator
            .start_stream(request(&h, "contact?"))
            .await
            .unwrap();
        let events = handle.collect().await;

        assert!(events
            .iter()
            .all(|e| !matches!(e, StreamEvent::PiiMask { .. })));
        assert!(matches!(events.last(), Some(StreamEvent::Done { .. })));

        let records = h.audit.by_conversation(h.conversation_id).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].stats.batches_failed, 1);
        assert!(records[0].regions.is_empty());
    }

    #[tokio::test]
    async fn fail_fallback_turns_detection_failure_into_error() {
        let chat = ScriptedChat::content(&["Reach me at alice@example.com today"]);
        let mut config = detection_config();
        config.detection.fallback = FallbackMode::Fail;
        let h = harness(config, Arc::new(chat), Arc::new(FailingDetector));

        let handle = h
            .orchestrator
            .start_stream(request(&h, "contact?"))
            .await
            .unwrap();
        let user_message_id = handle.user_message_id;
        let events = handle.collect().await;

        assert!(matches!(events.last(), Some(StreamEvent::Error { .. })));
        assert!(h.messages.message(user_message_id).unwrap().deleted);
    }

    #[tokio::test]
    async fn mid_stream_chat_error_cleans_up() {
        let chat = ScriptedChat::content(&["partial "])
            .then_error(ChatError::Stream("connection reset".to_string()));
        let h = harness(
            PipelineConfig::default(),
            Arc::new(chat),
            Arc::new(EmailDetector),
        );

        let handle = h
            .orchestrator
            .start_stream(request(&h, "hello"))
            .await
            .unwrap();
        let user_message_id = handle.user_message_id;
        let events = handle.collect().await;

        assert!(matches!(
            events.last(),
            Some(StreamEvent::Error { error }) if error == "Failed to get AI response"
        ));
        // No assistant row; the user message was rolled back.
        let rows = h.messages.messages_in(h.conversation_id);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].deleted);
        assert_eq!(rows[0].id, user_message_id);
        assert_eq!(h.tokens.daily_usage("user-1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn assistant_write_failure_cleans_up() {
        let chat = ScriptedChat::content(&["reply"]);
        let h = harness(
            PipelineConfig::default(),
            Arc::new(chat),
            Arc::new(EmailDetector),
        );
        h.messages.fail_assistant_creates(true);

        let handle = h
            .orchestrator
            .start_stream(request(&h, "hello"))
            .await
            .unwrap();
        let user_message_id = handle.user_message_id;
        let events = handle.collect().await;

        assert!(matches!(
            events.last(),
            Some(StreamEvent::Error { error }) if error == "Failed to process message"
        ));
        assert!(h.messages.message(user_message_id).unwrap().deleted);
    }

    #[tokio::test]
    async fn empty_completion_is_an_error() {
        let h = harness(
            PipelineConfig::default(),
            Arc::new(ScriptedChat::silent()),
            Arc::new(EmailDetector),
        );

        let handle = h
            .orchestrator
            .start_stream(request(&h, "hello"))
            .await
            .unwrap();
        let user_message_id = handle.user_message_id;
        let events = handle.collect().await;

        assert!(matches!(events.last(), Some(StreamEvent::Error { .. })));
        assert!(h.messages.message(user_message_id).unwrap().deleted);
    }

    #[tokio::test]
    async fn disconnect_aborts_and_rolls_back() {
        let h = harness(
            PipelineConfig::default(),
            Arc::new(HungChat),
            Arc::new(EmailDetector),
        );

        let handle = h
            .orchestrator
            .start_stream(request(&h, "hello"))
            .await
            .unwrap();
        let user_message_id = handle.user_message_id;
        handle.disconnect();

        // The channel closes once the task has finished cleanup.
        let events = handle.collect().await;
        assert!(events.iter().all(|e| !e.is_terminal()));
        assert!(h.messages.message(user_message_id).unwrap().deleted);
    }

    #[tokio::test]
    async fn estimates_apply_when_usage_is_missing() {
        // 13 content chars => ceil(13 / 4) = 4 completion tokens.
        let chat = ScriptedChat::content(&["Hello, world!"]);
        let h = harness(
            PipelineConfig::default(),
            Arc::new(chat),
            Arc::new(EmailDetector),
        );

        let handle = h
            .orchestrator
            .start_stream(request(&h, "say hello")) // 9 chars => 3 prompt tokens
            .await
            .unwrap();
        let events = handle.collect().await;

        let StreamEvent::Done { total_tokens, .. } = events.last().unwrap() else {
            panic!("expected done event");
        };
        assert_eq!(*total_tokens, 7);

        let rows = h.messages.messages_in(h.conversation_id);
        assert_eq!(rows[0].token_count, 3);
        assert_eq!(rows[1].token_count, 4);
    }
}
