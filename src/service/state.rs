use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::models::AppConfig;
use crate::service::dispatch::{BatchSettings, Dispatcher, JobStore, WorkerPool};
use crate::service::monitor::DispatchMonitor;
use crate::service::token::{TokenCache, TokenSource};
use crate::service::upstream::{encoder_from_config, VisitSender};

#[derive(Clone)]
pub struct CoreServices {
    pub tokens: Arc<TokenCache>,
    pub dispatcher: Arc<Dispatcher>,
    pub jobs: Arc<JobStore>,
    pub pool: Arc<WorkerPool>,
    pub monitor: Arc<DispatchMonitor>,
}

#[derive(Clone)]
pub struct ConfigState {
    pub max_visits_per_request: u32,
    pub max_visits_per_job: u32,
    pub delay_ms: u64,
    pub retention_secs: u64,
    pub cache_ttl_secs: u64,
    pub workers: usize,
    pub queue_capacity: usize,
}

#[derive(Clone)]
pub struct RuntimeState {
    // Parent of every job's cancellation token.
    pub shutdown: CancellationToken,
    // Cleared once shutdown starts; health reports it.
    pub is_running: Arc<RwLock<bool>>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

// Axum application state
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<CoreServices>,
    pub config: Arc<ConfigState>,
    pub runtime: Arc<RuntimeState>,
}

impl AppState {
    /// Wires the service graph around the two external collaborators. Spawns
    /// the worker pool, so it must run inside a tokio runtime.
    pub fn build(
        config: &AppConfig,
        source: Arc<dyn TokenSource>,
        sender: Arc<dyn VisitSender>,
        shutdown: CancellationToken,
    ) -> Self {
        let tokens = Arc::new(TokenCache::new(
            source,
            Duration::from_secs(config.token_source.cache_ttl_secs),
            config.token_source.default_region.clone(),
        ));
        let monitor = Arc::new(DispatchMonitor::new());
        let jobs = Arc::new(JobStore::new(config.jobs.max_tracked_jobs));
        let sync_settings = BatchSettings::from_config(&config.dispatch);
        let job_settings = sync_settings.with_time_budget_secs(config.jobs.time_budget_secs);

        let dispatcher = Arc::new(Dispatcher::new(
            tokens.clone(),
            sender,
            encoder_from_config(&config.upstream.payload),
            sync_settings,
            job_settings,
            jobs.clone(),
            monitor.clone(),
        ));

        let worker_dispatcher = dispatcher.clone();
        let pool = Arc::new(WorkerPool::start(
            config.jobs.workers,
            config.jobs.queue_capacity,
            move |job| {
                let dispatcher = worker_dispatcher.clone();
                async move { dispatcher.run_job(job).await }
            },
        ));

        let core = Arc::new(CoreServices {
            tokens,
            dispatcher,
            jobs,
            pool,
            monitor,
        });
        let config_state = Arc::new(ConfigState {
            max_visits_per_request: config.dispatch.max_visits_per_request,
            max_visits_per_job: config.jobs.max_visits_per_job,
            delay_ms: config.dispatch.delay_ms,
            retention_secs: config.jobs.retention_secs,
            cache_ttl_secs: config.token_source.cache_ttl_secs,
            workers: config.jobs.workers,
            queue_capacity: config.jobs.queue_capacity,
        });
        let runtime = Arc::new(RuntimeState {
            shutdown,
            is_running: Arc::new(RwLock::new(true)),
            started_at: chrono::Utc::now(),
        });

        Self {
            core,
            config: config_state,
            runtime,
        }
    }
}

impl axum::extract::FromRef<AppState> for Arc<CoreServices> {
    fn from_ref(state: &AppState) -> Self {
        state.core.clone()
    }
}

impl axum::extract::FromRef<AppState> for Arc<ConfigState> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl axum::extract::FromRef<AppState> for Arc<RuntimeState> {
    fn from_ref(state: &AppState) -> Self {
        state.runtime.clone()
    }
}
