use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use parking_lot::Mutex;

use crate::error::{TokenSourceError, VisitError};
use crate::models::{RawToken, TokenRecord};
use crate::service::token::TokenSource;
use crate::service::upstream::{VisitOutcome, VisitSender};

pub(crate) fn records(tokens: &[&str]) -> Vec<TokenRecord> {
    tokens
        .iter()
        .map(|t| TokenRecord {
            token: t.to_string(),
            region: "TEST".to_string(),
            account_id: None,
            nickname: None,
            claims_verified: false,
        })
        .collect()
}

fn raw(tokens: &[&str]) -> Vec<RawToken> {
    tokens
        .iter()
        .map(|t| RawToken {
            token: t.to_string(),
        })
        .collect()
}

/// Token source serving a settable list or a settable failure.
pub(crate) struct FakeTokenSource {
    next: Mutex<Result<Vec<RawToken>, TokenSourceError>>,
    calls: AtomicUsize,
    latency: Duration,
}

impl FakeTokenSource {
    pub(crate) fn with_tokens(tokens: &[&str]) -> Self {
        Self {
            next: Mutex::new(Ok(raw(tokens))),
            calls: AtomicUsize::new(0),
            latency: Duration::ZERO,
        }
    }

    pub(crate) fn failing(error: TokenSourceError) -> Self {
        Self {
            next: Mutex::new(Err(error)),
            calls: AtomicUsize::new(0),
            latency: Duration::ZERO,
        }
    }

    // Each fetch sleeps for `latency` before answering.
    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub(crate) fn set_tokens(&self, tokens: &[&str]) {
        *self.next.lock() = Ok(raw(tokens));
    }

    pub(crate) fn fail_with(&self, error: TokenSourceError) {
        *self.next.lock() = Err(error);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TokenSource for FakeTokenSource {
    fn fetch_tokens(&self) -> BoxFuture<'_, Result<Vec<RawToken>, TokenSourceError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = self.next.lock().clone();
        let latency = self.latency;
        Box::pin(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            result
        })
    }

    fn describe(&self) -> String {
        "fake://tokens".to_string()
    }
}

/// Visit sender that replays scripted outcomes, then falls back to a default,
/// recording every token it was handed.
pub(crate) struct FakeVisitSender {
    script: Mutex<VecDeque<Result<(), VisitError>>>,
    fallback: Result<(), VisitError>,
    seen: Mutex<Vec<String>>,
    latency: Duration,
}

impl FakeVisitSender {
    pub(crate) fn always_ok() -> Self {
        Self::scripted(Vec::new())
    }

    pub(crate) fn always_err(error: VisitError) -> Self {
        Self {
            fallback: Err(error),
            ..Self::always_ok()
        }
    }

    pub(crate) fn scripted(outcomes: Vec<Result<(), VisitError>>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            fallback: Ok(()),
            seen: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
        }
    }

    // Each send sleeps for `latency` (tokio time, so paused clocks apply).
    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub(crate) fn tokens_seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }
}

impl VisitSender for FakeVisitSender {
    fn send_visit<'a>(
        &'a self,
        token: &'a str,
        _payload: Bytes,
    ) -> BoxFuture<'a, Result<VisitOutcome, VisitError>> {
        self.seen.lock().push(token.to_string());
        let outcome = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        let latency = self.latency;
        Box::pin(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            outcome.map(|_| VisitOutcome {
                status: 200,
                latency,
            })
        })
    }
}
