//! Request throttling and daily token quotas.
//!
//! Both limits gate a stream before any work happens. The rate limiter is
//! a per-key sliding window over wall-clock instants; the token tracker
//! accumulates usage per user per UTC day.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;

use crate::store::StoreError;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Seconds until the window frees a slot. Zero when allowed.
    pub retry_after_secs: u64,
}

impl RateDecision {
    fn allowed() -> Self {
        Self {
            allowed: true,
            retry_after_secs: 0,
        }
    }
}

/// Sliding-window request limiter keyed by caller id.
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    hits: DashMap<String, Vec<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            hits: DashMap::new(),
        }
    }

    /// The production shape: N requests per rolling minute.
    pub fn per_minute(max_requests: usize) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }

    /// Record an attempt for `key` and decide whether it may proceed.
    /// Denied attempts do not consume a slot.
    pub fn check(&self, key: &str) -> RateDecision {
        let now = Instant::now();
        let mut entry = self.hits.entry(key.to_string()).or_default();
        entry.retain(|hit| now.duration_since(*hit) < self.window);

        if entry.len() >= self.max_requests {
            // Pushes are chronological, so the front is the next to expire.
            let oldest = entry[0];
            let elapsed_ms = now.duration_since(oldest).as_millis() as u64;
            let window_ms = self.window.as_millis() as u64;
            let retry_after_secs = window_ms.saturating_sub(elapsed_ms).div_ceil(1000).max(1);
            return RateDecision {
                allowed: false,
                retry_after_secs,
            };
        }

        entry.push(now);
        RateDecision::allowed()
    }

    /// Forget all recorded hits for a key.
    pub fn reset(&self, key: &str) {
        self.hits.remove(key);
    }
}

/// Per-user token accounting for quota enforcement.
#[async_trait]
pub trait TokenTracker: Send + Sync {
    /// Tokens consumed by this user so far today (UTC).
    async fn daily_usage(&self, user_id: &str) -> Result<u64, StoreError>;

    /// Add to today's total.
    async fn record_usage(&self, user_id: &str, tokens: u64) -> Result<(), StoreError>;
}

/// Day-keyed in-process tracker. Old days are left to rot; the map is
/// bounded by active users times retained days and this backs tests and
/// the demo only.
#[derive(Default)]
pub struct InMemoryTokenTracker {
    usage: DashMap<(String, NaiveDate), u64>,
}

impl InMemoryTokenTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preload today's total for a user.
    pub fn set_usage(&self, user_id: &str, tokens: u64) {
        self.usage
            .insert((user_id.to_string(), Utc::now().date_naive()), tokens);
    }
}

#[async_trait]
impl TokenTracker for InMemoryTokenTracker {
    async fn daily_usage(&self, user_id: &str) -> Result<u64, StoreError> {
        let key = (user_id.to_string(), Utc::now().date_naive());
        Ok(self.usage.get(&key).map(|v| *v).unwrap_or(0))
    }

    async fn record_usage(&self, user_id: &str, tokens: u64) -> Result<(), StoreError> {
        let key = (user_id.to_string(), Utc::now().date_naive());
        *self.usage.entry(key).or_insert(0) += tokens;
        Ok(())
    }
}
