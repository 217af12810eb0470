use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::error::{TokenSourceError, VisitError};
use crate::models::TokenRecord;
use crate::service::token::claims::build_record;
use crate::service::token::source::TokenSource;

#[derive(Default)]
struct CacheState {
    tokens: Arc<Vec<TokenRecord>>,
    fetched_at: Option<Instant>,
    fetched_at_unix: Option<i64>,
    valid: bool,
    last_error: Option<String>,
    // Bumped by every completed refresh attempt, successful or not.
    attempts: u64,
}

impl CacheState {
    fn usable(&self) -> bool {
        self.valid && !self.tokens.is_empty()
    }

    fn age(&self) -> Duration {
        self.fetched_at
            .map(|t| Instant::now().saturating_duration_since(t))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct TokenLookup {
    pub tokens: Arc<Vec<TokenRecord>>,
    pub from_cache: bool,
    // Served from the previous list because a refresh failed.
    pub stale: bool,
    pub age: Duration,
}

#[derive(Debug)]
pub enum RefreshResult {
    Refreshed(TokenLookup),
    Retained {
        error: TokenSourceError,
        lookup: TokenLookup,
    },
    Unavailable(TokenSourceError),
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheSnapshot {
    pub is_valid: bool,
    pub total_tokens: usize,
    pub tokens_by_region: BTreeMap<String, usize>,
    pub fetched_at: Option<i64>,
    pub age_seconds: Option<u64>,
    pub ttl_seconds: u64,
    pub expired: bool,
    pub last_error: Option<String>,
    pub source: String,
}

/// Token pool with TTL expiry. The list is only ever replaced wholesale, and
/// a failed refresh leaves the previous list in place.
pub struct TokenCache {
    source: Arc<dyn TokenSource>,
    ttl: Duration,
    default_region: String,
    state: RwLock<CacheState>,
    // Serializes refreshes so concurrent expired readers trigger one fetch.
    refresh_lock: Mutex<()>,
}

impl TokenCache {
    pub fn new(source: Arc<dyn TokenSource>, ttl: Duration, default_region: impl Into<String>) -> Self {
        Self {
            source,
            ttl,
            default_region: default_region.into(),
            state: RwLock::new(CacheState::default()),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn source_name(&self) -> String {
        self.source.describe()
    }

    async fn fresh_lookup(&self) -> Option<TokenLookup> {
        let state = self.state.read().await;
        if !state.usable() {
            return None;
        }
        let age = state.age();
        if age >= self.ttl {
            return None;
        }
        Some(TokenLookup {
            tokens: state.tokens.clone(),
            from_cache: true,
            stale: false,
            age,
        })
    }

    // Outcome of the attempt another caller finished after `seen` was read.
    async fn settled_since(&self, seen: u64) -> Option<Result<TokenLookup, VisitError>> {
        let state = self.state.read().await;
        if state.attempts == seen {
            return None;
        }
        if !state.usable() {
            return Some(Err(VisitError::NoTokens));
        }
        Some(Ok(TokenLookup {
            tokens: state.tokens.clone(),
            from_cache: true,
            stale: state.age() >= self.ttl,
            age: state.age(),
        }))
    }

    pub async fn get(&self) -> Result<TokenLookup, VisitError> {
        let seen = self.state.read().await.attempts;
        if let Some(lookup) = self.fresh_lookup().await {
            return Ok(lookup);
        }

        let _guard = self.refresh_lock.lock().await;
        // Callers that waited on another caller's attempt share its outcome,
        // so an outage costs one fetch rather than one per queued reader.
        if let Some(lookup) = self.fresh_lookup().await {
            return Ok(lookup);
        }
        if let Some(result) = self.settled_since(seen).await {
            return result;
        }

        match self.refresh_locked().await {
            RefreshResult::Refreshed(lookup) | RefreshResult::Retained { lookup, .. } => Ok(lookup),
            RefreshResult::Unavailable(e) => Err(VisitError::from(e)),
        }
    }

    pub async fn refresh(&self) -> RefreshResult {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> RefreshResult {
        let fetched = self.source.fetch_tokens().await.and_then(|raw| {
            let records: Vec<TokenRecord> = raw
                .into_iter()
                .filter_map(|r| build_record(r, &self.default_region))
                .collect();
            if records.is_empty() {
                Err(TokenSourceError::Empty)
            } else {
                Ok(records)
            }
        });

        let mut state = self.state.write().await;
        state.attempts += 1;
        match fetched {
            Ok(records) => {
                let tokens = Arc::new(records);
                tracing::info!(
                    "[TokenCache] Loaded {} tokens from {} ({})",
                    tokens.len(),
                    self.source.describe(),
                    format_region_counts(&count_regions(&tokens))
                );
                state.tokens = tokens.clone();
                state.fetched_at = Some(Instant::now());
                state.fetched_at_unix = Some(chrono::Utc::now().timestamp());
                state.valid = true;
                state.last_error = None;
                RefreshResult::Refreshed(TokenLookup {
                    tokens,
                    from_cache: false,
                    stale: false,
                    age: Duration::ZERO,
                })
            }
            Err(error) => {
                state.last_error = Some(error.to_string());
                if state.usable() {
                    tracing::warn!(
                        "[TokenCache] Refresh failed ({}), keeping {} cached tokens",
                        error,
                        state.tokens.len()
                    );
                    RefreshResult::Retained {
                        error,
                        lookup: TokenLookup {
                            tokens: state.tokens.clone(),
                            from_cache: true,
                            stale: true,
                            age: state.age(),
                        },
                    }
                } else {
                    tracing::error!("[TokenCache] Refresh failed with no cached tokens: {}", error);
                    RefreshResult::Unavailable(error)
                }
            }
        }
    }

    pub async fn snapshot(&self) -> CacheSnapshot {
        let state = self.state.read().await;
        let age = state.fetched_at.map(|_| state.age());
        CacheSnapshot {
            is_valid: state.valid,
            total_tokens: state.tokens.len(),
            tokens_by_region: count_regions(&state.tokens),
            fetched_at: state.fetched_at_unix,
            age_seconds: age.map(|a| a.as_secs()),
            ttl_seconds: self.ttl.as_secs(),
            expired: age.map(|a| a >= self.ttl).unwrap_or(true),
            last_error: state.last_error.clone(),
            source: self.source.describe(),
        }
    }
}

pub fn count_regions(tokens: &[TokenRecord]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for token in tokens {
        *counts.entry(token.region.clone()).or_insert(0) += 1;
    }
    counts
}

fn format_region_counts(counts: &BTreeMap<String, usize>) -> String {
    counts
        .iter()
        .map(|(region, count)| format!("{}={}", region, count))
        .collect::<Vec<_>>()
        .join(", ")
}
