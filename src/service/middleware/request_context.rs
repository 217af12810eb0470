use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

use crate::modules::system::request_context::{with_request_context, RequestContext};

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

// Reuses the caller's x-request-id or mints one, scopes it for log lines and
// echoes it on the response.
pub async fn request_context_middleware(request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty() && s.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let ctx = RequestContext {
        request_id: Some(request_id.clone()),
    };
    let mut response = with_request_context(ctx, async move { next.run(request).await }).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
