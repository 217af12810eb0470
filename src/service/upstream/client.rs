// Outbound visit client

use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use reqwest::{header, Client};
use tokio::time::Instant;

use crate::error::VisitError;
use crate::models::UpstreamConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitOutcome {
    pub status: u16,
    pub latency: Duration,
}

/// One authenticated POST against the configured endpoint.
pub trait VisitSender: Send + Sync {
    fn send_visit<'a>(
        &'a self,
        token: &'a str,
        payload: Bytes,
    ) -> BoxFuture<'a, Result<VisitOutcome, VisitError>>;
}

pub struct HttpVisitSender {
    client: Client,
    endpoint_url: String,
    base_headers: header::HeaderMap,
}

impl HttpVisitSender {
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, String> {
        let client = crate::utils::http::build_client(
            config.request_timeout_secs,
            Some(&config.upstream_proxy),
        )
        .map_err(|e| format!("failed_to_build_upstream_client: {}", e))?;
        Self::new(client, config)
    }

    pub fn new(client: Client, config: &UpstreamConfig) -> Result<Self, String> {
        let mut base_headers = header::HeaderMap::new();
        base_headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_str(&config.content_type)
                .map_err(|e| format!("invalid content type: {}", e))?,
        );
        for (name, value) in &config.extra_headers {
            let name = header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| format!("invalid header name {}: {}", name, e))?;
            let value = header::HeaderValue::from_str(value)
                .map_err(|e| format!("invalid header value for {}: {}", name, e))?;
            base_headers.insert(name, value);
        }

        Ok(Self {
            client,
            endpoint_url: config.endpoint_url.trim().to_string(),
            base_headers,
        })
    }

    async fn post(&self, token: &str, payload: Bytes) -> Result<VisitOutcome, VisitError> {
        let mut headers = self.base_headers.clone();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| VisitError::Encoding(format!("token is not a valid header value: {}", e)))?,
        );

        let started = Instant::now();
        let response = self
            .client
            .post(&self.endpoint_url)
            .headers(headers)
            .body(payload)
            .send()
            .await
            .map_err(VisitError::from)?;

        let status = response.status();
        let latency = started.elapsed();
        if status.is_success() {
            tracing::debug!("[Upstream] Visit accepted: status={}, latency={:?}", status, latency);
            Ok(VisitOutcome {
                status: status.as_u16(),
                latency,
            })
        } else {
            tracing::debug!("[Upstream] Visit rejected: status={}", status);
            Err(VisitError::Status(status.as_u16()))
        }
    }
}

impl VisitSender for HttpVisitSender {
    fn send_visit<'a>(
        &'a self,
        token: &'a str,
        payload: Bytes,
    ) -> BoxFuture<'a, Result<VisitOutcome, VisitError>> {
        Box::pin(self.post(token, payload))
    }
}
