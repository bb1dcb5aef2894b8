//! Structured tracking of in-flight detection work.
//!
//! Every dispatched detection runs as a task inside a [`DetectionTasks`]
//! group. The group is what makes the drain step a first-class operation:
//! finalization calls [`join_all`](DetectionTasks::join_all) and is
//! guaranteed to observe every task settle, so no detection result can be
//! silently lost at message close. Dropping the group aborts whatever is
//! still running, which is the error-path behavior.

use std::future::Future;

use tokio::task::JoinSet;
use tracing::warn;

/// Group of in-flight detection tasks for one stream.
#[derive(Default)]
pub struct DetectionTasks {
    set: JoinSet<()>,
}

impl DetectionTasks {
    pub fn new() -> Self {
        Self {
            set: JoinSet::new(),
        }
    }

    /// Dispatch one detection task into the group.
    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.set.spawn(task);
    }

    /// Number of tasks not yet joined.
    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Await settlement of every task in the group.
    ///
    /// Individual task panics are contained here: they are logged and drain
    /// continues, matching the rule that detection failures never unwind the
    /// stream.
    pub async fn join_all(&mut self) {
        while let Some(joined) = self.set.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    warn!("detection task panicked during drain");
                } else if e.is_cancelled() {
                    warn!("detection task cancelled before drain completed");
                }
            }
        }
    }
}
