use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::models::{JobStatus, RegionTally, StopReason};
use crate::service::dispatch::{BatchReport, BatchRequest};
use crate::service::handlers::errors::ApiError;
use crate::service::state::{ConfigState, CoreServices, RuntimeState};
use crate::service::token::TokenLookup;

const MAX_SERVER_LEN: usize = 16;

#[derive(Debug, Serialize)]
pub struct CacheInfo {
    pub used_cache: bool,
    pub stale: bool,
    pub cache_age_seconds: u64,
    pub ttl_seconds: u64,
    pub tokens_source: String,
}

#[derive(Debug, Serialize)]
pub struct VisitResponse {
    pub status: JobStatus,
    pub server: String,
    pub target_uid: u64,
    pub requested_visits: u32,
    pub processed: u32,
    pub successful_visits: u32,
    pub failed_visits: u32,
    pub skipped: u32,
    pub success_rate: f64,
    pub tokens_used: usize,
    pub results_by_region: BTreeMap<String, RegionTally>,
    pub failures_by_kind: BTreeMap<String, u32>,
    pub stop_reason: StopReason,
    pub execution_time: f64,
    pub timestamp: i64,
    pub cache_info: CacheInfo,
}

impl VisitResponse {
    fn from_report(
        request: &BatchRequest,
        report: BatchReport,
        lookup: &TokenLookup,
        ttl_seconds: u64,
        tokens_source: String,
    ) -> Self {
        let success_rate = report.tally.success_rate(report.requested);
        let skipped = report.skipped();
        Self {
            status: report.stop_reason.job_status(),
            server: request.server.clone(),
            target_uid: request.target_id,
            requested_visits: report.requested,
            processed: report.tally.processed,
            successful_visits: report.tally.successful,
            failed_visits: report.tally.failed,
            skipped,
            success_rate,
            tokens_used: report.tokens_used,
            results_by_region: report.tally.results_by_region,
            failures_by_kind: report.tally.failures_by_kind,
            stop_reason: report.stop_reason,
            execution_time: (report.elapsed.as_secs_f64() * 100.0).round() / 100.0,
            timestamp: chrono::Utc::now().timestamp(),
            cache_info: CacheInfo {
                used_cache: lookup.from_cache,
                stale: lookup.stale,
                cache_age_seconds: lookup.age.as_secs(),
                ttl_seconds,
                tokens_source,
            },
        }
    }
}

pub(crate) fn parse_server(raw: &str) -> Result<String, ApiError> {
    let server = raw.trim();
    if server.is_empty()
        || server.len() > MAX_SERVER_LEN
        || !server.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(ApiError::bad_request(format!(
            "Invalid server '{}': expected 1-{} letters or digits",
            raw, MAX_SERVER_LEN
        )));
    }
    Ok(server.to_ascii_uppercase())
}

pub(crate) fn parse_target_id(raw: &str) -> Result<u64, ApiError> {
    match raw.trim().parse::<u64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ApiError::bad_request(format!(
            "Invalid target uid '{}': expected a positive integer",
            raw
        ))),
    }
}

pub(crate) fn parse_count(raw: &str, limit: u32) -> Result<u32, ApiError> {
    let count: i64 = raw.trim().parse().map_err(|_| {
        ApiError::bad_request(format!("Invalid visit count '{}': expected an integer", raw))
    })?;
    if count <= 0 {
        return Err(ApiError::bad_request("Visit count must be positive"));
    }
    if count > i64::from(limit) {
        return Err(ApiError::bad_request(format!(
            "Maximum {} visits allowed per request",
            limit
        ))
        .with_details(serde_json::json!({ "limit": limit })));
    }
    Ok(count as u32)
}

pub(crate) fn parse_batch_request(
    server: &str,
    uid: &str,
    count: &str,
    limit: u32,
) -> Result<BatchRequest, ApiError> {
    Ok(BatchRequest {
        server: parse_server(server)?,
        target_id: parse_target_id(uid)?,
        count: parse_count(count, limit)?,
    })
}

async fn run_visits(
    core: &CoreServices,
    runtime: &RuntimeState,
    request: BatchRequest,
) -> Result<Json<VisitResponse>, ApiError> {
    crate::modules::system::logger::log_info(&format!(
        "Visit request: server={}, target={}, count={}",
        request.server, request.target_id, request.count
    ));

    let cancel = runtime.shutdown.child_token();
    let (report, lookup) = core.dispatcher.run_sync(&request, &cancel).await?;
    Ok(Json(VisitResponse::from_report(
        &request,
        report,
        &lookup,
        core.tokens.ttl().as_secs(),
        core.tokens.source_name(),
    )))
}

pub async fn handle_visits(
    State(core): State<Arc<CoreServices>>,
    State(config): State<Arc<ConfigState>>,
    State(runtime): State<Arc<RuntimeState>>,
    Path((server, uid, count)): Path<(String, String, String)>,
) -> Result<Json<VisitResponse>, ApiError> {
    let request = parse_batch_request(&server, &uid, &count, config.max_visits_per_request)?;
    run_visits(&core, &runtime, request).await
}

pub async fn handle_single_visit(
    State(core): State<Arc<CoreServices>>,
    State(runtime): State<Arc<RuntimeState>>,
    Path((server, uid)): Path<(String, String)>,
) -> Result<Json<VisitResponse>, ApiError> {
    let request = BatchRequest {
        server: parse_server(&server)?,
        target_id: parse_target_id(&uid)?,
        count: 1,
    };
    run_visits(&core, &runtime, request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn server_is_upper_cased_and_restricted() {
        assert_eq!(parse_server("ind").expect("valid"), "IND");
        assert!(parse_server("").is_err());
        assert!(parse_server("eu-west").is_err());
    }

    #[test]
    fn count_bounds_are_enforced() {
        assert_eq!(parse_count("50", 500).expect("valid"), 50);
        assert_eq!(parse_count("500", 500).expect("at limit"), 500);
        for bad in ["0", "-3", "501", "abc", "1.5"] {
            let err = parse_count(bad, 500).expect_err(bad);
            assert_eq!(err.status, StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn target_id_must_be_positive_integer() {
        assert_eq!(parse_target_id("4285785816").expect("valid"), 4_285_785_816);
        assert!(parse_target_id("0").is_err());
        assert!(parse_target_id("12ab").is_err());
    }
}
