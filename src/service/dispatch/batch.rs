use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::VisitError;
use crate::models::{DispatchConfig, StopReason, TokenRecord, VisitTally};
use crate::service::token::rotation::{token_for_visit, tokens_used};
use crate::service::upstream::retry::{apply_retry_strategy, determine_retry_strategy, retry_delay};
use crate::service::upstream::{PayloadEncoder, RetryPolicy, VisitOutcome, VisitSender};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub server: String,
    pub target_id: u64,
    pub count: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct BatchSettings {
    pub delay: Duration,
    pub time_budget: Option<Duration>,
    pub retry: RetryPolicy,
    // 0 disables the abort.
    pub max_consecutive_failures: u32,
}

impl BatchSettings {
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            delay: Duration::from_millis(config.delay_ms),
            time_budget: budget(config.time_budget_secs),
            retry: RetryPolicy::from_config(config),
            max_consecutive_failures: config.max_consecutive_failures,
        }
    }

    pub fn with_time_budget_secs(mut self, secs: u64) -> Self {
        self.time_budget = budget(secs);
        self
    }
}

fn budget(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub requested: u32,
    pub tally: VisitTally,
    pub stop_reason: StopReason,
    pub tokens_used: usize,
    pub elapsed: Duration,
}

impl BatchReport {
    // Visits never attempted because the batch stopped early.
    pub fn skipped(&self) -> u32 {
        self.requested.saturating_sub(self.tally.processed)
    }
}

async fn send_with_retry(
    sender: &dyn VisitSender,
    token: &str,
    payload: &bytes::Bytes,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<VisitOutcome, VisitError> {
    let mut attempt = 0;
    loop {
        match sender.send_visit(token, payload.clone()).await {
            Ok(outcome) => return Ok(outcome),
            Err(err) => {
                let strategy = determine_retry_strategy(&err, policy);
                let will_retry = attempt + 1 < policy.max_attempts
                    && retry_delay(&strategy, attempt).is_some();
                if !apply_retry_strategy(&strategy, attempt, policy, &err, cancel).await {
                    // A backoff cut short by cancellation abandons the visit;
                    // a final failure still counts as one.
                    if will_retry && cancel.is_cancelled() {
                        return Err(VisitError::Cancelled);
                    }
                    return Err(err);
                }
                attempt += 1;
            }
        }
    }
}

/// Runs `request.count` visits one after another, rotating through `tokens`.
///
/// Fails without sending anything when there are no tokens or the payload
/// cannot be built. Otherwise always returns a report, even when the batch
/// stops early; `progress` sees the tally after every visit.
pub async fn run_batch<F>(
    request: &BatchRequest,
    tokens: &[TokenRecord],
    sender: &dyn VisitSender,
    encoder: &dyn PayloadEncoder,
    settings: &BatchSettings,
    cancel: &CancellationToken,
    mut progress: F,
) -> Result<BatchReport, VisitError>
where
    F: FnMut(&VisitTally),
{
    if tokens.is_empty() {
        return Err(VisitError::NoTokens);
    }
    let payload = encoder.encode(request.target_id)?;

    let started = Instant::now();
    let deadline = settings.time_budget.map(|b| started + b);
    let mut tally = VisitTally::default();
    let mut consecutive_failures = 0_u32;
    let mut stop_reason = StopReason::Finished;

    tracing::info!(
        "[Dispatch] Batch started: server={}, target={}, count={}, tokens={}",
        request.server,
        request.target_id,
        request.count,
        tokens.len()
    );

    for index in 0..request.count {
        if cancel.is_cancelled() {
            stop_reason = StopReason::Cancelled;
            break;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            stop_reason = StopReason::TimeBudget;
            break;
        }

        let Some(record) = token_for_visit(tokens, index as usize) else {
            return Err(VisitError::NoTokens);
        };
        match send_with_retry(sender, &record.token, &payload, &settings.retry, cancel).await {
            // Abandoned mid-retry: not processed, so it counts as skipped.
            Err(VisitError::Cancelled) => {
                stop_reason = StopReason::Cancelled;
                break;
            }
            Ok(_) => {
                tally.record_success(&record.region);
                consecutive_failures = 0;
            }
            Err(err) => {
                tracing::debug!(
                    "[Dispatch] Visit {} failed (region={}): {}",
                    index + 1,
                    record.region,
                    err
                );
                tally.record_failure(&record.region, err.kind());
                consecutive_failures += 1;
            }
        }
        progress(&tally);

        if settings.max_consecutive_failures > 0
            && consecutive_failures >= settings.max_consecutive_failures
        {
            tracing::warn!(
                "[Dispatch] Aborting after {} consecutive failures",
                consecutive_failures
            );
            stop_reason = StopReason::TooManyFailures;
            break;
        }

        if index + 1 < request.count && !settings.delay.is_zero() {
            let mut wake = Instant::now() + settings.delay;
            if let Some(d) = deadline {
                wake = wake.min(d);
            }
            tokio::select! {
                _ = cancel.cancelled() => {
                    stop_reason = StopReason::Cancelled;
                    break;
                }
                _ = sleep_until(wake) => {}
            }
        }
    }

    let report = BatchReport {
        requested: request.count,
        tokens_used: tokens_used(tokens.len(), tally.processed as usize),
        tally,
        stop_reason,
        elapsed: started.elapsed(),
    };
    tracing::info!(
        "[Dispatch] Batch finished: target={}, processed={}/{}, success={}, failed={}, stop={:?}, elapsed={:.2}s",
        request.target_id,
        report.tally.processed,
        report.requested,
        report.tally.successful,
        report.tally.failed,
        report.stop_reason,
        report.elapsed.as_secs_f64()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::tests::fakes::{records, FakeVisitSender};
    use crate::service::upstream::payload::{ExternalHexPayload, ProtobufIdPayload};

    fn settings() -> BatchSettings {
        BatchSettings {
            delay: Duration::from_millis(500),
            time_budget: None,
            retry: RetryPolicy::no_retry(),
            max_consecutive_failures: 0,
        }
    }

    fn request(count: u32) -> BatchRequest {
        BatchRequest {
            server: "EU".to_string(),
            target_id: 42,
            count,
        }
    }

    fn encoder() -> ProtobufIdPayload {
        ProtobufIdPayload::new(1, vec![])
    }

    #[tokio::test(start_paused = true)]
    async fn tokens_rotate_in_index_order() {
        let sender = FakeVisitSender::always_ok();
        let tokens = records(&["a", "b", "c"]);
        let report = run_batch(
            &request(5),
            &tokens,
            &sender,
            &encoder(),
            &settings(),
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .expect("report");

        assert_eq!(sender.tokens_seen(), vec!["a", "b", "c", "a", "b"]);
        assert_eq!(report.tally.successful, 5);
        assert_eq!(report.tokens_used, 3);
        assert_eq!(report.stop_reason, StopReason::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn counts_stay_consistent_with_mixed_outcomes() {
        let sender = FakeVisitSender::scripted(vec![
            Ok(()),
            Err(VisitError::Status(401)),
            Ok(()),
            Err(VisitError::Timeout),
        ]);
        let tokens = records(&["a"]);
        let mut snapshots = Vec::new();
        let report = run_batch(
            &request(4),
            &tokens,
            &sender,
            &encoder(),
            &settings(),
            &CancellationToken::new(),
            |t| snapshots.push(t.processed),
        )
        .await
        .expect("report");

        assert_eq!(snapshots, vec![1, 2, 3, 4]);
        assert_eq!(report.tally.processed, 4);
        assert_eq!(report.tally.successful + report.tally.failed, report.tally.processed);
        assert_eq!(report.tally.failures_by_kind["status"], 1);
        assert_eq!(report.tally.failures_by_kind["timeout"], 1);
        assert_eq!(report.skipped(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_is_not_applied_after_last_visit() {
        let sender = FakeVisitSender::always_ok();
        let tokens = records(&["a"]);
        let report = run_batch(
            &request(3),
            &tokens,
            &sender,
            &encoder(),
            &settings(),
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .expect("report");

        assert!(report.elapsed >= Duration::from_millis(1000));
        assert!(report.elapsed < Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_on_the_same_token() {
        let sender = FakeVisitSender::scripted(vec![Err(VisitError::Status(503)), Ok(())]);
        let tokens = records(&["a", "b"]);
        let mut cfg = settings();
        cfg.retry = RetryPolicy {
            max_attempts: 3,
            base_ms: 100,
            max_ms: 1000,
        };
        let report = run_batch(
            &request(1),
            &tokens,
            &sender,
            &encoder(),
            &cfg,
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .expect("report");

        assert_eq!(sender.tokens_seen(), vec!["a", "a"]);
        assert_eq!(report.tally.successful, 1);
        assert_eq!(report.tally.failed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_failures_abort_as_partial() {
        let sender = FakeVisitSender::always_err(VisitError::Status(403));
        let tokens = records(&["a"]);
        let mut cfg = settings();
        cfg.max_consecutive_failures = 3;
        let report = run_batch(
            &request(10),
            &tokens,
            &sender,
            &encoder(),
            &cfg,
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .expect("report");

        assert_eq!(report.stop_reason, StopReason::TooManyFailures);
        assert_eq!(report.tally.processed, 3);
        assert_eq!(report.skipped(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn time_budget_stops_the_loop() {
        let sender = FakeVisitSender::always_ok();
        let tokens = records(&["a"]);
        let cfg = settings().with_time_budget_secs(1);
        let report = run_batch(
            &request(10),
            &tokens,
            &sender,
            &encoder(),
            &cfg,
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .expect("report");

        assert_eq!(report.stop_reason, StopReason::TimeBudget);
        assert_eq!(report.tally.processed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_delay_stops_the_batch() {
        let sender = FakeVisitSender::always_ok();
        let tokens = records(&["a"]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let report = run_batch(
            &request(10),
            &tokens,
            &sender,
            &encoder(),
            &settings(),
            &cancel,
            move |t| {
                if t.processed == 2 {
                    trigger.cancel();
                }
            },
        )
        .await
        .expect("report");

        assert_eq!(report.stop_reason, StopReason::Cancelled);
        assert_eq!(report.tally.processed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_backoff_abandons_the_visit() {
        let sender = FakeVisitSender::always_err(VisitError::Timeout);
        let tokens = records(&["a"]);
        let mut cfg = settings();
        cfg.retry = RetryPolicy {
            max_attempts: 5,
            base_ms: 1000,
            max_ms: 5000,
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let report = run_batch(
            &request(3),
            &tokens,
            &sender,
            &encoder(),
            &cfg,
            &cancel,
            |_| {},
        )
        .await
        .expect("report");

        assert_eq!(report.stop_reason, StopReason::Cancelled);
        assert_eq!(report.tally.processed, 0);
        assert_eq!(report.tally.failed, 0);
        assert!(report.tally.failures_by_kind.is_empty());
        assert_eq!(report.skipped(), 3);
        assert_eq!(sender.tokens_seen(), vec!["a"]);
    }

    #[tokio::test]
    async fn empty_token_list_aborts_before_sending() {
        let sender = FakeVisitSender::always_ok();
        let err = run_batch(
            &request(3),
            &[],
            &sender,
            &encoder(),
            &settings(),
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .expect_err("no tokens");
        assert_eq!(err, VisitError::NoTokens);
        assert!(sender.tokens_seen().is_empty());
    }

    #[tokio::test]
    async fn encoding_failure_aborts_before_sending() {
        let sender = FakeVisitSender::always_ok();
        let tokens = records(&["a"]);
        let err = run_batch(
            &request(3),
            &tokens,
            &sender,
            &ExternalHexPayload::new("not-hex"),
            &settings(),
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .expect_err("bad payload");
        assert!(err.aborts_batch());
        assert!(sender.tokens_seen().is_empty());
    }
}
