use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::error::VisitError;
use crate::service::dispatch::{AdmissionError, JobStoreError, SubmitError};

/// Error returned by every handler; rendered as
/// `{"error": {"code", "message", ...details}}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut error = json!({
            "code": self.code,
            "message": self.message,
        });
        if let (Some(Value::Object(extra)), Some(obj)) = (self.details, error.as_object_mut()) {
            for (key, value) in extra {
                obj.entry(key).or_insert(value);
            }
        }
        (self.status, Json(json!({ "error": error }))).into_response()
    }
}

impl From<VisitError> for ApiError {
    fn from(err: VisitError) -> Self {
        match &err {
            VisitError::NoTokens => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "no_tokens",
                "No tokens available; the token source could not be loaded",
            ),
            VisitError::Encoding(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "payload_encoding",
                err.to_string(),
            ),
            VisitError::Cancelled => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "cancelled", err.to_string())
            }
            VisitError::Network(_) | VisitError::Timeout | VisitError::Status(_) => {
                Self::new(StatusCode::BAD_GATEWAY, "upstream_error", err.to_string())
            }
        }
    }
}

impl From<JobStoreError> for ApiError {
    fn from(err: JobStoreError) -> Self {
        match &err {
            JobStoreError::Full(_) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "job_table_full", err.to_string())
            }
            JobStoreError::NotFound(_) => Self::not_found(err.to_string()),
            JobStoreError::AlreadyFinished { status, .. } => {
                Self::new(StatusCode::CONFLICT, "job_finished", err.to_string())
                    .with_details(json!({ "status": status }))
            }
        }
    }
}

impl From<AdmissionError> for ApiError {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::Store(e) => e.into(),
            AdmissionError::Queue(SubmitError::QueueFull) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "queue_full",
                "Job queue is full, retry later",
            ),
            AdmissionError::Queue(SubmitError::Closed) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "shutting_down",
                "Service is shutting down",
            ),
        }
    }
}
