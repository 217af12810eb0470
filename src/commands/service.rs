use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::models::AppConfig;
use crate::modules::system::scheduler::{self, SchedulerSettings};
use crate::service::token::{HttpTokenSource, RefreshResult, TokenSource};
use crate::service::upstream::{HttpVisitSender, VisitSender};
use crate::service::AxumServer;

const SERVER_STOP_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub running: bool,
    pub port: u16,
    pub base_url: String,
    pub loaded_tokens: usize,
}

#[derive(Clone, Default)]
pub struct ServiceState {
    pub instance: Arc<RwLock<Option<ServiceInstance>>>,
    pub starting: Arc<AtomicBool>,
}

pub struct ServiceInstance {
    pub axum_server: AxumServer,
    pub server_handle: tokio::task::JoinHandle<()>,
    pub scheduler_handles: Vec<tokio::task::JoinHandle<()>>,
    pub shutdown: CancellationToken,
    pub drain_timeout: Duration,
}

impl ServiceState {
    pub fn new() -> Self {
        Self::default()
    }
}

struct StartingGuard(Arc<AtomicBool>);
impl Drop for StartingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub async fn start_service(
    config: &AppConfig,
    state: &ServiceState,
) -> Result<ServiceStatus, String> {
    let source = HttpTokenSource::from_config(&config.token_source)
        .map_err(|e| format!("Failed to build token source client: {}", e))?;
    let sender = HttpVisitSender::from_config(&config.upstream)?;
    start_service_with(config, state, Arc::new(source), Arc::new(sender)).await
}

/// Starts the listener, loads tokens once and launches the maintenance loops.
/// A failed initial token load is logged; the service still starts degraded.
pub async fn start_service_with(
    config: &AppConfig,
    state: &ServiceState,
    source: Arc<dyn TokenSource>,
    sender: Arc<dyn VisitSender>,
) -> Result<ServiceStatus, String> {
    {
        let instance_lock = state.instance.read().await;
        if instance_lock.is_some() {
            return Err("Service is already running".to_string());
        }
    }
    if state
        .starting
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err("Service is starting, please wait...".to_string());
    }
    let _starting_guard = StartingGuard(state.starting.clone());

    let shutdown = CancellationToken::new();
    let (axum_server, server_handle) =
        AxumServer::start(config, source, sender, shutdown.clone()).await?;

    let core = axum_server.state.core.clone();
    let loaded_tokens = match core.tokens.refresh().await {
        RefreshResult::Refreshed(lookup) => lookup.tokens.len(),
        RefreshResult::Retained { lookup, .. } => lookup.tokens.len(),
        RefreshResult::Unavailable(e) => {
            tracing::warn!(
                "Initial token load failed ({}); endpoints report no tokens until a refresh succeeds",
                e
            );
            0
        }
    };

    let scheduler_handles = scheduler::start_scheduler(
        core.tokens.clone(),
        core.jobs.clone(),
        SchedulerSettings::from_config(config),
        shutdown.clone(),
    );
    axum_server.set_running(true).await;

    let port = axum_server.local_port;
    *state.instance.write().await = Some(ServiceInstance {
        axum_server,
        server_handle,
        scheduler_handles,
        shutdown,
        drain_timeout: Duration::from_secs(config.jobs.shutdown_grace_secs),
    });

    Ok(ServiceStatus {
        running: true,
        port,
        base_url: format!("http://127.0.0.1:{}", port),
        loaded_tokens,
    })
}

/// Cancels every running job, waits for the workers within the grace period
/// and stops the accept loop.
pub async fn stop_service(state: &ServiceState) -> Result<(), String> {
    let Some(instance) = state.instance.write().await.take() else {
        return Ok(());
    };

    instance.axum_server.set_running(false).await;
    instance.shutdown.cancel();
    instance
        .axum_server
        .state
        .core
        .pool
        .shutdown(instance.drain_timeout)
        .await;

    for handle in instance.scheduler_handles {
        let _ = handle.await;
    }

    let mut server_handle = instance.server_handle;
    match tokio::time::timeout(SERVER_STOP_TIMEOUT, &mut server_handle).await {
        Ok(Ok(())) => {
            tracing::info!("Visit service task exited cleanly");
        }
        Ok(Err(e)) => {
            tracing::warn!("Visit service task join error during shutdown: {}", e);
        }
        Err(_) => {
            tracing::warn!("Visit service shutdown timed out; aborting server task");
            server_handle.abort();
            let _ = server_handle.await;
        }
    }

    Ok(())
}
