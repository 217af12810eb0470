use futures::future::BoxFuture;
use reqwest::Client;

use crate::error::TokenSourceError;
use crate::models::{RawToken, TokenSourceConfig};

/// Where the token pool comes from.
pub trait TokenSource: Send + Sync {
    fn fetch_tokens(&self) -> BoxFuture<'_, Result<Vec<RawToken>, TokenSourceError>>;

    // Human-readable origin for stats output.
    fn describe(&self) -> String;
}

/// GETs a JSON array of `{"token": ...}` objects.
pub struct HttpTokenSource {
    client: Client,
    url: String,
}

impl HttpTokenSource {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn from_config(config: &TokenSourceConfig) -> Result<Self, reqwest::Error> {
        let client = crate::utils::http::build_client(config.fetch_timeout_secs, None)?;
        Ok(Self::new(client, config.url.trim()))
    }

    async fn fetch(&self) -> Result<Vec<RawToken>, TokenSourceError> {
        tracing::info!("[TokenSource] Fetching token list from {}", self.url);
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| TokenSourceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TokenSourceError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| TokenSourceError::Network(e.to_string()))?;
        parse_token_list(&body)
    }
}

impl TokenSource for HttpTokenSource {
    fn fetch_tokens(&self) -> BoxFuture<'_, Result<Vec<RawToken>, TokenSourceError>> {
        Box::pin(self.fetch())
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

pub fn parse_token_list(body: &str) -> Result<Vec<RawToken>, TokenSourceError> {
    serde_json::from_str::<Vec<RawToken>>(body).map_err(|e| TokenSourceError::Decode(e.to_string()))
}
