use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::models::{StopReason, VisitTally};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DispatchStats {
    pub total_batches: u64,
    pub sync_batches: u64,
    pub job_batches: u64,
    pub aborted_batches: u64,
    pub total_visits: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub failures_by_kind: BTreeMap<String, u64>,
    pub stopped_early: BTreeMap<String, u64>,
    pub last_batch_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOrigin {
    Sync,
    Job,
}

/// Process-wide dispatch counters for `/stats`.
pub struct DispatchMonitor {
    stats: RwLock<DispatchStats>,
}

impl Default for DispatchMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchMonitor {
    pub fn new() -> Self {
        Self {
            stats: RwLock::new(DispatchStats::default()),
        }
    }

    pub async fn record_batch(&self, origin: BatchOrigin, tally: &VisitTally, stop: StopReason) {
        let mut stats = self.stats.write().await;
        stats.total_batches += 1;
        match origin {
            BatchOrigin::Sync => stats.sync_batches += 1,
            BatchOrigin::Job => stats.job_batches += 1,
        }
        stats.total_visits += u64::from(tally.processed);
        stats.success_count += u64::from(tally.successful);
        stats.error_count += u64::from(tally.failed);
        for (kind, count) in &tally.failures_by_kind {
            *stats.failures_by_kind.entry(kind.clone()).or_insert(0) += u64::from(*count);
        }
        if stop != StopReason::Finished {
            let label = serde_json::to_value(stop)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| format!("{:?}", stop));
            *stats.stopped_early.entry(label).or_insert(0) += 1;
        }
        stats.last_batch_at = Some(chrono::Utc::now().timestamp());
    }

    // Batch that failed before any visit was sent (no tokens, bad payload).
    pub async fn record_aborted(&self, origin: BatchOrigin, kind: &str) {
        let mut stats = self.stats.write().await;
        stats.total_batches += 1;
        stats.aborted_batches += 1;
        match origin {
            BatchOrigin::Sync => stats.sync_batches += 1,
            BatchOrigin::Job => stats.job_batches += 1,
        }
        *stats.failures_by_kind.entry(kind.to_string()).or_insert(0) += 1;
        stats.last_batch_at = Some(chrono::Utc::now().timestamp());
    }

    pub async fn get_stats(&self) -> DispatchStats {
        self.stats.read().await.clone()
    }

    pub async fn clear(&self) {
        *self.stats.write().await = DispatchStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn batches_accumulate_into_counters() {
        let monitor = DispatchMonitor::new();
        let mut tally = VisitTally::default();
        tally.record_success("EU");
        tally.record_failure("EU", "timeout");
        monitor
            .record_batch(BatchOrigin::Sync, &tally, StopReason::Finished)
            .await;
        monitor
            .record_batch(BatchOrigin::Job, &tally, StopReason::TooManyFailures)
            .await;
        monitor.record_aborted(BatchOrigin::Sync, "no_tokens").await;

        let stats = monitor.get_stats().await;
        assert_eq!(stats.total_batches, 3);
        assert_eq!(stats.sync_batches, 2);
        assert_eq!(stats.aborted_batches, 1);
        assert_eq!(stats.total_visits, 4);
        assert_eq!(stats.success_count + stats.error_count, stats.total_visits);
        assert_eq!(stats.failures_by_kind["timeout"], 2);
        assert_eq!(stats.failures_by_kind["no_tokens"], 1);
        assert_eq!(stats.stopped_early["too_many_failures"], 1);

        monitor.clear().await;
        assert_eq!(monitor.get_stats().await, DispatchStats::default());
    }
}
