use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::service::handlers::errors::ApiError;
use crate::service::state::{ConfigState, CoreServices};
use crate::service::token::cache::count_regions;
use crate::service::token::claims::{token_fingerprint, token_preview};
use crate::service::token::RefreshResult;

pub async fn handle_stats(
    State(core): State<Arc<CoreServices>>,
    State(config): State<Arc<ConfigState>>,
) -> Response {
    // Loads the pool on first use; a failure still leaves a useful snapshot.
    if let Err(e) = core.tokens.get().await {
        tracing::debug!("[Stats] Token pool unavailable: {}", e);
    }
    let snapshot = core.tokens.snapshot().await;
    let dispatch = core.monitor.get_stats().await;

    Json(json!({
        "total_tokens": snapshot.total_tokens,
        "available_regions": snapshot.tokens_by_region.keys().collect::<Vec<_>>(),
        "tokens_by_region": snapshot.tokens_by_region,
        "cache_info": snapshot,
        "dispatch": dispatch,
        "jobs": {
            "counts": core.jobs.counts(),
            "queue_depth": core.pool.queue_depth(),
            "queue_capacity": config.queue_capacity,
            "workers": config.workers,
        },
    }))
    .into_response()
}

pub async fn handle_test_token(
    State(core): State<Arc<CoreServices>>,
    Path(index): Path<String>,
) -> Result<Response, ApiError> {
    let lookup = core.tokens.get().await?;
    let total = lookup.tokens.len();
    let out_of_range = || {
        ApiError::bad_request(format!("Invalid index. Valid range: 1-{}", total))
            .with_details(json!({ "total_tokens": total }))
    };

    let index: usize = index.trim().parse().map_err(|_| out_of_range())?;
    let record = index
        .checked_sub(1)
        .and_then(|i| lookup.tokens.get(i))
        .ok_or_else(out_of_range)?;

    Ok(Json(json!({
        "token_index": index,
        "total_tokens": total,
        "region": record.region,
        "account_id": record.account_id,
        "nickname": record.nickname,
        "claims_verified": record.claims_verified,
        "token_preview": token_preview(&record.token),
        "token_fingerprint": token_fingerprint(&record.token),
        "cache_info": {
            "is_cached": lookup.from_cache,
            "stale": lookup.stale,
            "age_seconds": lookup.age.as_secs(),
        },
    }))
    .into_response())
}

pub async fn handle_refresh_tokens(State(core): State<Arc<CoreServices>>) -> Response {
    crate::modules::system::logger::log_info("Forced token refresh requested");
    match core.tokens.refresh().await {
        RefreshResult::Refreshed(lookup) => {
            let by_region = count_regions(&lookup.tokens);
            Json(json!({
                "status": "success",
                "message": format!("Refreshed {} tokens", lookup.tokens.len()),
                "count": lookup.tokens.len(),
                "regions": by_region.keys().collect::<Vec<_>>(),
                "tokens_by_region": by_region,
                "cache_timestamp": chrono::Utc::now().timestamp(),
                "cache_age": 0,
            }))
            .into_response()
        }
        RefreshResult::Retained { error, lookup } => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "refresh_failed",
            format!("Failed to refresh tokens: {}", error),
        )
        .with_details(json!({
            "cache_status": core.tokens.snapshot().await,
            "retained_tokens": lookup.tokens.len(),
        }))
        .into_response(),
        RefreshResult::Unavailable(error) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "refresh_failed",
            format!("Failed to refresh tokens: {}", error),
        )
        .with_details(json!({
            "cache_status": core.tokens.snapshot().await,
            "retained_tokens": 0,
        }))
        .into_response(),
    }
}
