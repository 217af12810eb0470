use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::error::VisitError;
use crate::models::{JobRecord, JobStatus, StopReason};
use crate::service::dispatch::batch::{run_batch, BatchReport, BatchRequest, BatchSettings};
use crate::service::dispatch::jobs::{JobStore, JobStoreError};
use crate::service::dispatch::pool::{QueuedJob, SubmitError, WorkerPool};
use crate::service::monitor::{BatchOrigin, DispatchMonitor};
use crate::service::token::{TokenCache, TokenLookup};
use crate::service::upstream::{PayloadEncoder, VisitSender};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error(transparent)]
    Store(#[from] JobStoreError),

    #[error(transparent)]
    Queue(#[from] SubmitError),
}

/// Wires the token cache, sender and payload encoder into batch runs, for
/// both synchronous requests and queued jobs.
pub struct Dispatcher {
    tokens: Arc<TokenCache>,
    sender: Arc<dyn VisitSender>,
    encoder: Arc<dyn PayloadEncoder>,
    sync_settings: BatchSettings,
    job_settings: BatchSettings,
    jobs: Arc<JobStore>,
    monitor: Arc<DispatchMonitor>,
}

impl Dispatcher {
    pub fn new(
        tokens: Arc<TokenCache>,
        sender: Arc<dyn VisitSender>,
        encoder: Arc<dyn PayloadEncoder>,
        sync_settings: BatchSettings,
        job_settings: BatchSettings,
        jobs: Arc<JobStore>,
        monitor: Arc<DispatchMonitor>,
    ) -> Self {
        Self {
            tokens,
            sender,
            encoder,
            sync_settings,
            job_settings,
            jobs,
            monitor,
        }
    }

    pub async fn run_sync(
        &self,
        request: &BatchRequest,
        cancel: &CancellationToken,
    ) -> Result<(BatchReport, TokenLookup), VisitError> {
        let lookup = match self.tokens.get().await {
            Ok(lookup) => lookup,
            Err(e) => {
                self.monitor.record_aborted(BatchOrigin::Sync, e.kind()).await;
                return Err(e);
            }
        };

        let result = run_batch(
            request,
            &lookup.tokens,
            self.sender.as_ref(),
            self.encoder.as_ref(),
            &self.sync_settings,
            cancel,
            |_| {},
        )
        .await;

        match result {
            Ok(report) => {
                self.monitor
                    .record_batch(BatchOrigin::Sync, &report.tally, report.stop_reason)
                    .await;
                Ok((report, lookup))
            }
            Err(e) => {
                self.monitor.record_aborted(BatchOrigin::Sync, e.kind()).await;
                Err(e)
            }
        }
    }

    /// Registers a job and queues it. The record is rolled back when the
    /// queue refuses it, so a rejected submission leaves no trace.
    pub fn submit_job(
        &self,
        pool: &WorkerPool,
        request: BatchRequest,
        parent: &CancellationToken,
    ) -> Result<JobRecord, AdmissionError> {
        let (record, cancel) =
            self.jobs
                .create(&request.server, request.target_id, request.count, parent)?;
        let queued = QueuedJob {
            id: record.id.clone(),
            request,
            cancel,
        };
        if let Err(e) = pool.submit(queued) {
            self.jobs.remove(&record.id);
            tracing::warn!("[Jobs] Rejected job {}: {}", record.id, e);
            return Err(e.into());
        }
        tracing::info!(
            "[Jobs] Queued job {} (target={}, count={})",
            record.id,
            record.target_id,
            record.requested
        );
        Ok(record)
    }

    /// Worker entry point for one queued job.
    pub async fn run_job(&self, job: QueuedJob) {
        let mut started = false;
        self.jobs.update(&job.id, |record| {
            if record.status == JobStatus::Queued {
                record.status = JobStatus::Processing;
                record.started_at = Some(Utc::now());
                started = true;
            }
        });
        if !started {
            tracing::debug!("[Jobs] Skipping job {} (no longer queued)", job.id);
            return;
        }
        if job.cancel.is_cancelled() {
            self.finish(&job.id, JobStatus::Cancelled, Some(StopReason::Cancelled), None);
            return;
        }

        let lookup = match self.tokens.get().await {
            Ok(lookup) => lookup,
            Err(e) => {
                self.monitor.record_aborted(BatchOrigin::Job, e.kind()).await;
                self.finish(&job.id, JobStatus::Failed, None, Some(e.to_string()));
                return;
            }
        };

        let jobs = self.jobs.clone();
        let id = job.id.clone();
        let result = run_batch(
            &job.request,
            &lookup.tokens,
            self.sender.as_ref(),
            self.encoder.as_ref(),
            &self.job_settings,
            &job.cancel,
            |tally| {
                jobs.update(&id, |record| record.tally = tally.clone());
            },
        )
        .await;

        match result {
            Ok(report) => {
                self.monitor
                    .record_batch(BatchOrigin::Job, &report.tally, report.stop_reason)
                    .await;
                let status = report.stop_reason.job_status();
                self.jobs.update(&job.id, |record| {
                    record.tally = report.tally.clone();
                    record.status = status;
                    record.stop_reason = Some(report.stop_reason);
                    record.finished_at = Some(Utc::now());
                });
                tracing::info!(
                    "[Jobs] Job {} finished: {:?} ({}/{} successful)",
                    job.id,
                    status,
                    report.tally.successful,
                    report.requested
                );
            }
            Err(e) => {
                self.monitor.record_aborted(BatchOrigin::Job, e.kind()).await;
                self.finish(&job.id, JobStatus::Failed, None, Some(e.to_string()));
            }
        }
    }

    fn finish(&self, id: &str, status: JobStatus, stop: Option<StopReason>, error: Option<String>) {
        if let Some(error) = &error {
            tracing::warn!("[Jobs] Job {} failed: {}", id, error);
        }
        self.jobs.update(id, |record| {
            record.status = status;
            record.stop_reason = stop;
            record.error = error;
            record.finished_at = Some(Utc::now());
        });
    }
}
