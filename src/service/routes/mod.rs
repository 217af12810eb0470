use axum::{
    routing::{get, post},
    Router,
};

use crate::service::handlers;
use crate::service::state::AppState;

// Static first segments (jobs, test, stats, ...) take priority over the
// `/:server/...` captures, so a server literally named "jobs" is unreachable.
// Under /jobs the router needs one parameter name per position: `:key` is a
// job id in the two-segment form and a server in the four-segment form.
pub fn build_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(crate::service::health::health_check_handler))
        .route("/healthz", get(crate::service::health::health_check_handler))
        .route("/stats", get(handlers::tokens::handle_stats))
        .route(
            "/refresh-tokens",
            get(handlers::tokens::handle_refresh_tokens).post(handlers::tokens::handle_refresh_tokens),
        )
        .route("/test/token/:index", get(handlers::tokens::handle_test_token))
        .route("/jobs", get(handlers::jobs::handle_list_jobs))
        .route("/jobs/purge", post(handlers::jobs::handle_purge_jobs))
        .route(
            "/jobs/:key",
            get(handlers::jobs::handle_get_job).delete(handlers::jobs::handle_cancel_job),
        )
        .route(
            "/jobs/:key/:uid/:count",
            post(handlers::jobs::handle_submit_job),
        )
        .route("/:server/:uid", get(handlers::visits::handle_single_visit))
        .route(
            "/:server/:uid/:count",
            get(handlers::visits::handle_visits).post(handlers::visits::handle_visits),
        )
}
