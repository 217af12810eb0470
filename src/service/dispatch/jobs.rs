use std::time::Duration;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::models::{JobRecord, JobStatus, JobSummary, StopReason};

const JOB_ID_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobStoreError {
    #[error("job table is full ({0} tracked jobs)")]
    Full(usize),

    #[error("job {0} not found")]
    NotFound(String),

    #[error("job {id} already finished with status {status:?}")]
    AlreadyFinished { id: String, status: JobStatus },
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct JobCounts {
    pub total: usize,
    pub queued: usize,
    pub processing: usize,
    pub finished: usize,
}

struct JobEntry {
    record: JobRecord,
    cancel: CancellationToken,
}

/// Registry of background jobs. Every read returns a clone of one record
/// taken under that record's shard lock.
pub struct JobStore {
    jobs: DashMap<String, JobEntry>,
    max_tracked: usize,
    // Makes the capacity check and the insert one step for concurrent creates.
    admission: Mutex<()>,
}

fn generate_job_id() -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(JOB_ID_LEN)
        .map(char::from)
        .collect()
}

impl JobStore {
    pub fn new(max_tracked: usize) -> Self {
        Self {
            jobs: DashMap::new(),
            max_tracked: max_tracked.max(1),
            admission: Mutex::new(()),
        }
    }

    /// Registers a queued job. The returned token is a child of `parent`, so
    /// cancelling the parent reaches every job.
    pub fn create(
        &self,
        server: &str,
        target_id: u64,
        requested: u32,
        parent: &CancellationToken,
    ) -> Result<(JobRecord, CancellationToken), JobStoreError> {
        let _admission = self.admission.lock();
        if self.jobs.len() >= self.max_tracked {
            let purged = self.purge_finished(Duration::ZERO);
            tracing::debug!("[Jobs] Table at capacity, purged {} finished jobs", purged);
            if self.jobs.len() >= self.max_tracked {
                return Err(JobStoreError::Full(self.max_tracked));
            }
        }

        loop {
            let id = generate_job_id();
            match self.jobs.entry(id.clone()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    let record = JobRecord::new(id, server.to_string(), target_id, requested);
                    let cancel = parent.child_token();
                    slot.insert(JobEntry {
                        record: record.clone(),
                        cancel: cancel.clone(),
                    });
                    return Ok((record, cancel));
                }
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<JobRecord> {
        self.jobs.get(id).map(|entry| entry.record.clone())
    }

    // Newest first.
    pub fn list(&self) -> Vec<JobSummary> {
        let mut summaries: Vec<JobSummary> = self
            .jobs
            .iter()
            .map(|entry| entry.record.summary())
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        summaries
    }

    /// Applies `apply` to the record and bumps `updated_at`. Returns the new
    /// snapshot, or `None` for an unknown id.
    pub fn update<F>(&self, id: &str, apply: F) -> Option<JobRecord>
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut entry = self.jobs.get_mut(id)?;
        apply(&mut entry.record);
        entry.record.updated_at = Utc::now();
        Some(entry.record.clone())
    }

    // Drops a job that never made it into the queue.
    pub fn remove(&self, id: &str) -> Option<JobRecord> {
        self.jobs.remove(id).map(|(_, entry)| entry.record)
    }

    /// Requests cancellation. A queued job is finalized right away; a running
    /// job is finalized by its worker once the batch loop observes the token.
    pub fn cancel(&self, id: &str) -> Result<JobRecord, JobStoreError> {
        let mut entry = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| JobStoreError::NotFound(id.to_string()))?;

        let status = entry.record.status;
        if status.is_terminal() {
            return Err(JobStoreError::AlreadyFinished {
                id: id.to_string(),
                status,
            });
        }

        entry.cancel.cancel();
        let now = Utc::now();
        if status == JobStatus::Queued {
            entry.record.status = JobStatus::Cancelled;
            entry.record.stop_reason = Some(StopReason::Cancelled);
            entry.record.finished_at = Some(now);
        }
        entry.record.updated_at = now;
        tracing::info!("[Jobs] Cancellation requested for job {} ({:?})", id, status);
        Ok(entry.record.clone())
    }

    /// Removes finished jobs whose `finished_at` is at least `older_than` ago.
    pub fn purge_finished(&self, older_than: Duration) -> usize {
        let age = chrono::Duration::from_std(older_than).unwrap_or_else(|_| chrono::Duration::days(36_500));
        let cutoff = Utc::now().checked_sub_signed(age);
        let before = self.jobs.len();
        self.jobs.retain(|_, entry| {
            let record = &entry.record;
            if !record.status.is_terminal() {
                return true;
            }
            match (record.finished_at, cutoff) {
                (Some(finished), Some(cutoff)) => finished > cutoff,
                (Some(_), None) => true,
                (None, _) => false,
            }
        });
        before.saturating_sub(self.jobs.len())
    }

    pub fn counts(&self) -> JobCounts {
        let mut counts = JobCounts::default();
        for entry in self.jobs.iter() {
            counts.total += 1;
            match entry.record.status {
                JobStatus::Queued => counts.queued += 1,
                JobStatus::Processing => counts.processing += 1,
                _ => counts.finished += 1,
            }
        }
        counts
    }
}
