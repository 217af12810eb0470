use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::VisitError;
use crate::models::DispatchConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_ms: u64,
    pub max_ms: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_ms: config.retry_base_ms,
            max_ms: config.retry_max_ms.max(config.retry_base_ms),
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_ms: 0,
            max_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryStrategy {
    NoRetry,
    FixedDelay(Duration),
    ExponentialBackoff { base_ms: u64, max_ms: u64 },
}

pub fn determine_retry_strategy(error: &VisitError, policy: &RetryPolicy) -> RetryStrategy {
    if !error.is_transient() || policy.max_attempts <= 1 {
        return RetryStrategy::NoRetry;
    }
    match error {
        // Rate limited: waiting the full ceiling beats hammering the endpoint.
        VisitError::Status(429) => RetryStrategy::FixedDelay(Duration::from_millis(policy.max_ms)),
        _ => RetryStrategy::ExponentialBackoff {
            base_ms: policy.base_ms,
            max_ms: policy.max_ms,
        },
    }
}

// Delay before retry number `attempt` (0-based count of failures so far).
pub fn retry_delay(strategy: &RetryStrategy, attempt: u32) -> Option<Duration> {
    match strategy {
        RetryStrategy::NoRetry => None,
        RetryStrategy::FixedDelay(duration) => Some(*duration),
        RetryStrategy::ExponentialBackoff { base_ms, max_ms } => {
            let factor = 2_u64.saturating_pow(attempt.min(32));
            Some(Duration::from_millis(base_ms.saturating_mul(factor).min(*max_ms)))
        }
    }
}

// Sleeps for the strategy's delay. Returns false when no further attempt
// should be made (non-retryable, attempts exhausted, or cancelled).
pub async fn apply_retry_strategy(
    strategy: &RetryStrategy,
    attempt: u32,
    policy: &RetryPolicy,
    error: &VisitError,
    cancel: &CancellationToken,
) -> bool {
    if attempt + 1 >= policy.max_attempts {
        debug!(
            "Attempts exhausted ({}/{}), last error: {}",
            attempt + 1,
            policy.max_attempts,
            error
        );
        return false;
    }
    let Some(delay) = retry_delay(strategy, attempt) else {
        debug!("Non-retryable error {}, stopping", error);
        return false;
    };

    debug!(
        "Retrying after {}: attempt={}/{}, delay={}ms",
        error,
        attempt + 2,
        policy.max_attempts,
        delay.as_millis()
    );
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_ms: 200,
            max_ms: 2000,
        }
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        assert_eq!(
            determine_retry_strategy(&VisitError::Status(401), &policy()),
            RetryStrategy::NoRetry
        );
        assert_eq!(
            determine_retry_strategy(&VisitError::Encoding("x".into()), &policy()),
            RetryStrategy::NoRetry
        );
    }

    #[test]
    fn single_attempt_policy_never_retries() {
        assert_eq!(
            determine_retry_strategy(&VisitError::Timeout, &RetryPolicy::no_retry()),
            RetryStrategy::NoRetry
        );
    }

    #[test]
    fn rate_limit_waits_the_ceiling() {
        assert_eq!(
            determine_retry_strategy(&VisitError::Status(429), &policy()),
            RetryStrategy::FixedDelay(Duration::from_millis(2000))
        );
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let strategy = determine_retry_strategy(&VisitError::Timeout, &policy());
        assert_eq!(retry_delay(&strategy, 0), Some(Duration::from_millis(200)));
        assert_eq!(retry_delay(&strategy, 1), Some(Duration::from_millis(400)));
        assert_eq!(retry_delay(&strategy, 4), Some(Duration::from_millis(2000)));
        assert_eq!(retry_delay(&strategy, 60), Some(Duration::from_millis(2000)));
    }

    #[tokio::test(start_paused = true)]
    async fn apply_stops_after_last_attempt() {
        let cancel = CancellationToken::new();
        let err = VisitError::Timeout;
        let strategy = determine_retry_strategy(&err, &policy());
        assert!(apply_retry_strategy(&strategy, 0, &policy(), &err, &cancel).await);
        assert!(apply_retry_strategy(&strategy, 1, &policy(), &err, &cancel).await);
        assert!(!apply_retry_strategy(&strategy, 2, &policy(), &err, &cancel).await);
    }

    #[tokio::test]
    async fn cancellation_interrupts_backoff() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = VisitError::Timeout;
        let strategy = RetryStrategy::FixedDelay(Duration::from_secs(3600));
        assert!(!apply_retry_strategy(&strategy, 0, &policy(), &err, &cancel).await);
    }
}
