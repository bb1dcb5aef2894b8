//! The streaming half of the pipeline: buffering, batch extraction, the
//! event channel, background detection tasks, and the orchestrator that
//! drives one exchange from admission to the terminal event.

pub mod batch;
pub mod buffer;
pub mod channel;
pub mod orchestrator;
pub mod tasks;

pub use batch::{extract_batches, Extraction};
pub use buffer::{Cursor, StreamBuffer};
pub use channel::{EventSendError, EventSender, EventStream};
pub use orchestrator::{StreamHandle, StreamOrchestrator, StreamRequest};
pub use tasks::DetectionTasks;
