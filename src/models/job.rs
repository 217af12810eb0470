use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Partial,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Queued | JobStatus::Processing)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Finished,
    TimeBudget,
    TooManyFailures,
    Cancelled,
}

impl StopReason {
    pub fn job_status(self) -> JobStatus {
        match self {
            StopReason::Finished => JobStatus::Completed,
            StopReason::TimeBudget | StopReason::TooManyFailures => JobStatus::Partial,
            StopReason::Cancelled => JobStatus::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegionTally {
    pub success: u32,
    pub fail: u32,
}

/// Running counts for a batch. `successful + failed == processed` holds after
/// every `record_*` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VisitTally {
    pub processed: u32,
    pub successful: u32,
    pub failed: u32,
    pub results_by_region: BTreeMap<String, RegionTally>,
    pub failures_by_kind: BTreeMap<String, u32>,
}

impl VisitTally {
    pub fn record_success(&mut self, region: &str) {
        self.processed += 1;
        self.successful += 1;
        self.results_by_region
            .entry(region.to_string())
            .or_default()
            .success += 1;
    }

    pub fn record_failure(&mut self, region: &str, kind: &str) {
        self.processed += 1;
        self.failed += 1;
        self.results_by_region
            .entry(region.to_string())
            .or_default()
            .fail += 1;
        *self.failures_by_kind.entry(kind.to_string()).or_insert(0) += 1;
    }

    pub fn success_rate(&self, requested: u32) -> f64 {
        if requested == 0 {
            return 0.0;
        }
        let rate = self.successful as f64 / requested as f64 * 100.0;
        (rate * 100.0).round() / 100.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub status: JobStatus,
    pub server: String,
    pub target_id: u64,
    pub requested: u32,
    #[serde(flatten)]
    pub tally: VisitTally,
    pub stop_reason: Option<StopReason>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(id: String, server: String, target_id: u64, requested: u32) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Queued,
            server,
            target_id,
            requested,
            tally: VisitTally::default(),
            stop_reason: None,
            error: None,
            created_at: now,
            started_at: None,
            finished_at: None,
            updated_at: now,
        }
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id.clone(),
            status: self.status,
            target_id: self.target_id,
            requested: self.requested,
            processed: self.tally.processed,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: String,
    pub status: JobStatus,
    pub target_id: u64,
    pub requested: u32,
    pub processed: u32,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_keeps_processed_equal_to_success_plus_fail() {
        let mut tally = VisitTally::default();
        tally.record_success("EU");
        tally.record_failure("EU", "status");
        tally.record_failure("SG", "timeout");
        tally.record_success("SG");

        assert_eq!(tally.processed, 4);
        assert_eq!(tally.successful + tally.failed, tally.processed);
        assert_eq!(tally.results_by_region["EU"], RegionTally { success: 1, fail: 1 });
        assert_eq!(tally.failures_by_kind["timeout"], 1);
    }

    #[test]
    fn success_rate_is_rounded_to_two_decimals() {
        let mut tally = VisitTally::default();
        tally.record_success("X");
        assert_eq!(tally.success_rate(3), 33.33);
        assert_eq!(tally.success_rate(0), 0.0);
    }

    #[test]
    fn stop_reason_maps_to_terminal_status() {
        assert_eq!(StopReason::Finished.job_status(), JobStatus::Completed);
        assert_eq!(StopReason::TimeBudget.job_status(), JobStatus::Partial);
        assert_eq!(StopReason::Cancelled.job_status(), JobStatus::Cancelled);
        assert!(StopReason::TooManyFailures.job_status().is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn record_serializes_tally_inline() {
        let record = JobRecord::new("abc".into(), "EU".into(), 42, 10);
        let value = serde_json::to_value(&record).expect("serialize");
        assert_eq!(value["status"], "queued");
        assert_eq!(value["processed"], 0);
        assert_eq!(value["target_id"], 42);
    }
}
