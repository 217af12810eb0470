use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}
pub type AppResult<T> = Result<T, AppError>;

/// Failure while pulling the remote token list.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenSourceError {
    #[error("token source unreachable: {0}")]
    Network(String),

    #[error("token source returned HTTP {0}")]
    Status(u16),

    #[error("token source payload could not be decoded: {0}")]
    Decode(String),

    #[error("token source returned no usable tokens")]
    Empty,
}

/// Outcome classification for a single outbound visit or for a batch that
/// could not start.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VisitError {
    #[error("network error: {0}")]
    Network(String),

    #[error("upstream request timed out")]
    Timeout,

    #[error("upstream responded with HTTP {0}")]
    Status(u16),

    #[error("payload encoding failed: {0}")]
    Encoding(String),

    #[error("no tokens available")]
    NoTokens,

    #[error("batch cancelled")]
    Cancelled,
}

impl VisitError {
    pub fn kind(&self) -> &'static str {
        match self {
            VisitError::Network(_) => "network",
            VisitError::Timeout => "timeout",
            VisitError::Status(_) => "status",
            VisitError::Encoding(_) => "encoding",
            VisitError::NoTokens => "no_tokens",
            VisitError::Cancelled => "cancelled",
        }
    }

    // 408, 429 and 5xx are worth another attempt; other statuses are a
    // rejection of this token or payload.
    pub fn is_transient(&self) -> bool {
        match self {
            VisitError::Network(_) | VisitError::Timeout => true,
            VisitError::Status(code) => matches!(code, 408 | 429) || (500..=599).contains(code),
            VisitError::Encoding(_) | VisitError::NoTokens | VisitError::Cancelled => false,
        }
    }

    // Errors that make the whole batch pointless before a single send.
    pub fn aborts_batch(&self) -> bool {
        matches!(self, VisitError::Encoding(_) | VisitError::NoTokens)
    }
}

impl From<reqwest::Error> for VisitError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            VisitError::Timeout
        } else if let Some(status) = err.status() {
            VisitError::Status(status.as_u16())
        } else {
            VisitError::Network(err.to_string())
        }
    }
}

impl From<TokenSourceError> for VisitError {
    fn from(_: TokenSourceError) -> Self {
        VisitError::NoTokens
    }
}
