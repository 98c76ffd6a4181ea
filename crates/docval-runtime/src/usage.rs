//! Token usage accounting for a validator.

use docval_core::ReportUsage;
use parking_lot::RwLock;

use crate::providers::TokenUsage;

/// Accumulates backend usage across the calls of one validation run.
#[derive(Debug, Default)]
pub struct UsageTracker {
    usage: RwLock<ReportUsage>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed backend call.
    pub fn record(&self, usage: &TokenUsage) {
        let mut total = self.usage.write();
        total.requests += 1;
        total.prompt_tokens += u64::from(usage.prompt_tokens);
        total.completion_tokens += u64::from(usage.completion_tokens);
        total.cache_read_tokens += u64::from(usage.cache_read_tokens);
        total.cache_creation_tokens += u64::from(usage.cache_creation_tokens);
    }

    /// Usage so far.
    pub fn snapshot(&self) -> ReportUsage {
        *self.usage.read()
    }

    /// Start a new run.
    pub fn reset(&self) {
        *self.usage.write() = ReportUsage::default();
    }
}
