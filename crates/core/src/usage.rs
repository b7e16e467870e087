//! Run-wide token usage accounting.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use crate::provider::Usage;

/// Lock-free token counters shared by every branch of a run.
#[derive(Debug, Default)]
pub struct UsageTracker {
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
    total_tokens: AtomicU64,
    calls: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub calls: u64,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the usage reported by one model call.
    pub fn record(&self, usage: &Usage) {
        self.prompt_tokens
            .fetch_add(u64::from(usage.prompt_tokens), Ordering::Relaxed);
        self.completion_tokens
            .fetch_add(u64::from(usage.completion_tokens), Ordering::Relaxed);
        self.total_tokens
            .fetch_add(u64::from(usage.total_tokens), Ordering::Relaxed);
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total(&self) -> u64 {
        self.total_tokens.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            prompt_tokens: self.prompt_tokens.load(Ordering::Relaxed),
            completion_tokens: self.completion_tokens.load(Ordering::Relaxed),
            total_tokens: self.total(),
            calls: self.calls.load(Ordering::Relaxed),
        }
    }

    /// Share of `max_tokens` consumed so far, in percent.
    pub fn percent_of(&self, max_tokens: u64) -> f64 {
        if max_tokens == 0 {
            return 100.0;
        }
        self.total() as f64 * 100.0 / max_tokens as f64
    }

    /// True once usage is strictly above `threshold * max_tokens`.
    pub fn exceeds(&self, max_tokens: u64, threshold: f64) -> bool {
        self.total() as f64 > max_tokens as f64 * threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(total: u32) -> Usage {
        Usage {
            prompt_tokens: total / 2,
            completion_tokens: total - total / 2,
            total_tokens: total,
        }
    }

    #[test]
    fn record_accumulates() {
        let tracker = UsageTracker::new();
        tracker.record(&usage(100));
        tracker.record(&usage(51));
        let snap = tracker.snapshot();
        assert_eq!(snap.total_tokens, 151);
        assert_eq!(snap.prompt_tokens, 75);
        assert_eq!(snap.completion_tokens, 76);
        assert_eq!(snap.calls, 2);
    }

    #[test]
    fn threshold_is_strict() {
        let tracker = UsageTracker::new();
        tracker.record(&usage(850));
        assert!(!tracker.exceeds(1000, 0.85));
        tracker.record(&usage(1));
        assert!(tracker.exceeds(1000, 0.85));
    }

    #[test]
    fn percent_of_budget() {
        let tracker = UsageTracker::new();
        tracker.record(&usage(250));
        assert!((tracker.percent_of(1000) - 25.0).abs() < f64::EPSILON);
        assert!((tracker.percent_of(0) - 100.0).abs() < f64::EPSILON);
    }
}
