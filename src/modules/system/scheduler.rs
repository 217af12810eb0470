use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{self, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::models::AppConfig;
use crate::modules::system::logger;
use crate::service::dispatch::JobStore;
use crate::service::token::{RefreshResult, TokenCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    // Zero leaves token refresh lazy.
    pub refresh_interval: Option<Duration>,
    pub purge_interval: Option<Duration>,
    pub retention: Duration,
}

impl SchedulerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let every = |secs: u64| (secs > 0).then(|| Duration::from_secs(secs));
        Self {
            refresh_interval: every(config.token_source.refresh_interval_secs),
            purge_interval: every(config.jobs.purge_interval_secs),
            retention: Duration::from_secs(config.jobs.retention_secs),
        }
    }
}

async fn run_token_refresh(tokens: &TokenCache) {
    match tokens.refresh().await {
        RefreshResult::Refreshed(lookup) => logger::log_info(&format!(
            "[Scheduler] Token refresh completed: count={}",
            lookup.tokens.len()
        )),
        RefreshResult::Retained { error, lookup } => logger::log_warn(&format!(
            "[Scheduler] Token refresh failed, keeping {} cached tokens: {}",
            lookup.tokens.len(),
            error
        )),
        RefreshResult::Unavailable(error) => {
            logger::log_warn(&format!("[Scheduler] Token refresh failed: {}", error))
        }
    }
}

fn run_job_purge(jobs: &JobStore, retention: Duration) {
    let purged = jobs.purge_finished(retention);
    if purged > 0 {
        logger::log_info(&format!(
            "[Scheduler] Purged {} finished jobs older than {}s",
            purged,
            retention.as_secs()
        ));
    }
}

fn interval_after_first_period(period: Duration) -> time::Interval {
    let mut interval = time::interval_at(time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Spawns the background maintenance loops. Each disabled loop is skipped;
/// the returned handles finish once `shutdown` is cancelled.
pub fn start_scheduler(
    tokens: Arc<TokenCache>,
    jobs: Arc<JobStore>,
    settings: SchedulerSettings,
    shutdown: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    if let Some(period) = settings.refresh_interval {
        let shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            logger::log_info(&format!(
                "[Scheduler] Token refresh scheduled every {}s",
                period.as_secs()
            ));
            let mut interval = interval_after_first_period(period);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => run_token_refresh(&tokens).await,
                }
            }
        }));
    }

    if let Some(period) = settings.purge_interval {
        handles.push(tokio::spawn(async move {
            logger::log_info(&format!(
                "[Scheduler] Job purge scheduled every {}s (retention {}s)",
                period.as_secs(),
                settings.retention.as_secs()
            ));
            let mut interval = interval_after_first_period(period);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => run_job_purge(&jobs, settings.retention),
                }
            }
        }));
    }

    handles
}
