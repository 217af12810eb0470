use std::sync::Arc;

use axum::{
    extract::State,
    response::{IntoResponse, Json, Response},
};

use crate::service::state::{ConfigState, CoreServices, RuntimeState};

const ENDPOINTS: &[&str] = &[
    "GET|POST /<server>/<uid>/<count> - Send N visits",
    "GET /<server>/<uid> - Send 1 visit",
    "POST /jobs/<server>/<uid>/<count> - Queue N visits as a background job",
    "GET /jobs - List jobs",
    "GET /jobs/<id> - Job progress",
    "DELETE /jobs/<id> - Cancel a job",
    "POST /jobs/purge - Drop finished jobs",
    "GET /stats - Token and dispatch statistics",
    "GET /test/token/<index> - Inspect one token",
    "GET|POST /refresh-tokens - Force token refresh",
    "GET /health - Health check",
];

// Reads the cache snapshot only; a probe never triggers a token fetch.
pub async fn health_check_handler(
    State(core): State<Arc<CoreServices>>,
    State(config): State<Arc<ConfigState>>,
    State(runtime): State<Arc<RuntimeState>>,
) -> Response {
    let snapshot = core.tokens.snapshot().await;
    let available = snapshot.is_valid && snapshot.total_tokens > 0;
    let uptime = (chrono::Utc::now() - runtime.started_at).num_seconds().max(0);
    let status = if !*runtime.is_running.read().await {
        "stopping"
    } else if available {
        "healthy"
    } else {
        "degraded"
    };

    Json(serde_json::json!({
        "status": status,
        "service": crate::constants::SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": uptime,
        "tokens_status": {
            "available": available,
            "count": snapshot.total_tokens,
            "source": snapshot.source,
            "cache_age": snapshot.age_seconds,
            "expired": snapshot.expired,
            "last_error": snapshot.last_error,
        },
        "configuration": {
            "delay_between_visits_ms": config.delay_ms,
            "max_visits_per_request": config.max_visits_per_request,
            "max_visits_per_job": config.max_visits_per_job,
            "token_cache_ttl_secs": config.cache_ttl_secs,
            "workers": config.workers,
            "queue_capacity": config.queue_capacity,
        },
        "jobs": {
            "queue_depth": core.pool.queue_depth(),
            "counts": core.jobs.counts(),
        },
        "endpoints": ENDPOINTS,
    }))
    .into_response()
}
