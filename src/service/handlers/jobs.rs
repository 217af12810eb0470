use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::models::JobStatus;
use crate::service::handlers::errors::ApiError;
use crate::service::handlers::visits::parse_batch_request;
use crate::service::state::{ConfigState, CoreServices, RuntimeState};

pub async fn handle_submit_job(
    State(core): State<Arc<CoreServices>>,
    State(config): State<Arc<ConfigState>>,
    State(runtime): State<Arc<RuntimeState>>,
    Path((server, uid, count)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    let request = parse_batch_request(&server, &uid, &count, config.max_visits_per_job)?;

    // Fail fast instead of queueing a job that can only fail.
    core.tokens.get().await?;

    let record = core
        .dispatcher
        .submit_job(&core.pool, request, &runtime.shutdown)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "job_id": record.id,
            "status": record.status,
            "poll_url": format!("/jobs/{}", record.id),
            "server": record.server,
            "target_uid": record.target_id,
            "requested_visits": record.requested,
        })),
    )
        .into_response())
}

pub async fn handle_list_jobs(State(core): State<Arc<CoreServices>>) -> Response {
    Json(json!({
        "jobs": core.jobs.list(),
        "counts": core.jobs.counts(),
        "queue_depth": core.pool.queue_depth(),
    }))
    .into_response()
}

pub async fn handle_get_job(
    State(core): State<Arc<CoreServices>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let record = core
        .jobs
        .get(&id)
        .ok_or_else(|| ApiError::not_found(format!("job {} not found", id)))?;
    let success_rate = record.tally.success_rate(record.requested);
    let mut body = serde_json::to_value(&record).map_err(|e| {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string())
    })?;
    if let Some(obj) = body.as_object_mut() {
        obj.insert("success_rate".to_string(), json!(success_rate));
    }
    Ok(Json(body).into_response())
}

pub async fn handle_cancel_job(
    State(core): State<Arc<CoreServices>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let record = core.jobs.cancel(&id)?;
    let cancellation = if record.status == JobStatus::Cancelled {
        "completed"
    } else {
        "requested"
    };
    Ok(Json(json!({
        "job_id": record.id,
        "status": record.status,
        "cancellation": cancellation,
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
pub struct PurgeParams {
    pub older_than_secs: Option<u64>,
}

pub async fn handle_purge_jobs(
    State(core): State<Arc<CoreServices>>,
    State(config): State<Arc<ConfigState>>,
    Query(params): Query<PurgeParams>,
) -> Response {
    let older_than = params.older_than_secs.unwrap_or(config.retention_secs);
    let purged = core.jobs.purge_finished(Duration::from_secs(older_than));
    tracing::info!("[Jobs] Purged {} finished jobs older than {}s", purged, older_than);
    Json(json!({
        "purged": purged,
        "older_than_secs": older_than,
        "remaining": core.jobs.counts().total,
    }))
    .into_response()
}
