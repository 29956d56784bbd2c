//! Retry engine with pluggable backoff, jitter and retry predicates.
//!
//! Attempts are numbered from 1. The wait after attempt `n` is
//! `base_delay(n)` (clamped to `max_delay`) plus, when jitter is on, a
//! random extra of up to 10% of that clamped value.

use super::cancellation::CancellationScope;
use super::classification;
use crate::settings::NetworkSettings;
use crate::{CoreError, CoreResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Decides whether a failed attempt may be retried
pub type RetryPredicate = Arc<dyn Fn(&anyhow::Error) -> bool + Send + Sync>;

/// Growth of the wait between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// initial
    Constant,
    /// initial * n
    Linear,
    /// initial * 2^(n-1)
    Exponential,
    /// initial * fib(n), fib(1) = fib(2) = 1
    Fibonacci,
}

#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    backoff: BackoffKind,
    jitter: bool,
    retry_if: RetryPredicate,
}

impl RetryPolicy {
    /// Exponential backoff without jitter, retrying on transient errors.
    ///
    /// `max_attempts` is raised to 1 and `max_delay` to `initial_delay`
    /// when given smaller values.
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay: max_delay.max(initial_delay),
            backoff: BackoffKind::Exponential,
            jitter: false,
            retry_if: Arc::new(classification::default_retry_if),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffKind) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Replace the retry predicate
    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&anyhow::Error) -> bool + Send + Sync + 'static,
    {
        self.retry_if = Arc::new(predicate);
        self
    }

    /// Retry every failure the breaker and scope allow
    pub fn retry_all(self) -> Self {
        self.retry_if(|_| true)
    }

    /// 3 attempts, 1s to 30s exponential with jitter
    pub fn standard() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(30)).with_jitter(true)
    }

    /// 5 attempts, 500ms to 60s exponential with jitter, network predicate
    pub fn network() -> Self {
        Self::new(5, Duration::from_millis(500), Duration::from_secs(60))
            .with_jitter(true)
            .retry_if(classification::network_retry_if)
    }

    /// 3 attempts, 100ms to 5s linear without jitter, file predicate
    pub fn file() -> Self {
        Self::new(3, Duration::from_millis(100), Duration::from_secs(5))
            .with_backoff(BackoffKind::Linear)
            .retry_if(classification::file_retry_if)
    }

    /// Network preset sized from configuration.
    ///
    /// Waits never exceed one request timeout.
    pub fn from_settings(settings: &NetworkSettings) -> Self {
        let initial = Duration::from_millis(500);
        let ceiling = Duration::from_secs(settings.timeout_seconds);
        Self::new(settings.retry_count, initial, ceiling)
            .with_jitter(true)
            .retry_if(classification::network_retry_if)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn backoff(&self) -> BackoffKind {
        self.backoff
    }

    pub fn jitter(&self) -> bool {
        self.jitter
    }

    /// Whether the predicate accepts `error` for another attempt.
    /// Breaker rejections and cancellations are never retried.
    pub fn should_retry(&self, error: &anyhow::Error) -> bool {
        !classification::is_breaker_rejection(error)
            && !classification::is_cancellation(error)
            && (self.retry_if)(error)
    }

    /// Wait after attempt `attempt` before jitter, never above `max_delay`
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let n = attempt.max(1);
        let factor = match self.backoff {
            BackoffKind::Constant => Some(1),
            BackoffKind::Linear => Some(n),
            BackoffKind::Exponential => 2u32.checked_pow(n - 1),
            BackoffKind::Fibonacci => fibonacci(n),
        };

        factor
            .and_then(|f| self.initial_delay.checked_mul(f))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Wait after attempt `attempt`, including jitter when enabled
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if !self.jitter || base.is_zero() {
            return base;
        }
        let spread: f64 = rand::thread_rng().gen_range(0.0..=0.1);
        base + base.mul_f64(spread)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff", &self.backoff)
            .field("jitter", &self.jitter)
            .finish_non_exhaustive()
    }
}

fn fibonacci(n: u32) -> Option<u32> {
    let (mut prev, mut current) = (0u32, 1u32);
    for _ in 1..n {
        let next = prev.checked_add(current)?;
        prev = current;
        current = next;
    }
    Some(current)
}

/// Run `operation` under `policy` with no cancellation
pub async fn execute<T, F, Fut>(policy: &RetryPolicy, operation: F) -> CoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    execute_with_cancellation(&CancellationScope::new(), policy, operation).await
}

/// Run `operation` under `policy`, giving up as soon as `scope` ends
pub async fn execute_with_cancellation<T, F, Fut>(
    scope: &CancellationScope,
    policy: &RetryPolicy,
    operation: F,
) -> CoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    execute_with_notify(scope, policy, operation, |_, _| {}).await
}

/// Like [`execute_with_cancellation`], calling `on_failure(attempt, error)`
/// after every failed attempt, including the last one.
pub async fn execute_with_notify<T, F, Fut, N>(
    scope: &CancellationScope,
    policy: &RetryPolicy,
    mut operation: F,
    mut on_failure: N,
) -> CoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
    N: FnMut(u32, &anyhow::Error),
{
    let mut attempt = 1;

    loop {
        scope.check()?;

        let error = match scope.run(operation()).await? {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        on_failure(attempt, &error);

        if !policy.should_retry(&error) {
            tracing::debug!(attempt, error = %format!("{error:#}"), "Error is not retryable");
            return Err(CoreError::NonRetryable {
                attempt,
                source: error,
            });
        }

        if attempt >= policy.max_attempts {
            tracing::warn!(
                max_attempts = policy.max_attempts,
                error = %format!("{error:#}"),
                "Retry attempts exhausted"
            );
            return Err(CoreError::MaxAttemptsExceeded {
                max_attempts: policy.max_attempts,
                source: error,
            });
        }

        let delay = policy.delay_for(attempt);
        tracing::debug!(
            attempt,
            max_attempts = policy.max_attempts,
            delay = %humantime::format_duration(delay),
            error = %format!("{error:#}"),
            "Attempt failed, retrying"
        );
        scope.sleep(delay).await?;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(5))
            .retry_all()
    }

    #[test]
    fn test_exponential_delays() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_secs(10));

        assert_eq!(policy.base_delay(1), Duration::from_millis(100));
        assert_eq!(policy.base_delay(2), Duration::from_millis(200));
        assert_eq!(policy.base_delay(3), Duration::from_millis(400));
        assert_eq!(policy.base_delay(4), Duration::from_millis(800));
    }

    #[test]
    fn test_linear_constant_fibonacci_delays() {
        let base = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_secs(10));

        let linear = base.clone().with_backoff(BackoffKind::Linear);
        assert_eq!(linear.base_delay(3), Duration::from_millis(300));

        let constant = base.clone().with_backoff(BackoffKind::Constant);
        assert_eq!(constant.base_delay(4), Duration::from_millis(100));

        let fib = base.with_backoff(BackoffKind::Fibonacci);
        let delays: Vec<u128> = (1..=6).map(|n| fib.base_delay(n).as_millis()).collect();
        assert_eq!(delays, vec![100, 100, 200, 300, 500, 800]);
    }

    #[test]
    fn test_delay_clamped_to_max() {
        let policy = RetryPolicy::new(50, Duration::from_millis(100), Duration::from_secs(1));
        assert_eq!(policy.base_delay(10), Duration::from_secs(1));
        // overflowing factors still clamp
        assert_eq!(policy.base_delay(40), Duration::from_secs(1));
        let fib = policy.with_backoff(BackoffKind::Fibonacci);
        assert_eq!(fib.base_delay(60), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_secs(10))
            .with_jitter(true);

        for _ in 0..100 {
            let delay = policy.delay_for(2);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(220));
        }
    }

    #[test]
    fn test_jitter_varies_between_calls() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_secs(10))
            .with_jitter(true);

        let delays: std::collections::HashSet<Duration> =
            (0..50).map(|_| policy.delay_for(2)).collect();
        assert!(delays.len() >= 2, "jitter produced a single delay: {delays:?}");

        let fixed = policy.clone().with_jitter(false);
        assert_eq!(fixed.delay_for(2), Duration::from_millis(200));
    }

    #[test]
    fn test_constructor_normalizes_bounds() {
        let policy = RetryPolicy::new(0, Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.max_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_presets() {
        assert_eq!(RetryPolicy::standard().max_attempts(), 3);
        assert_eq!(RetryPolicy::network().max_attempts(), 5);
        assert_eq!(RetryPolicy::file().backoff(), BackoffKind::Linear);
        assert!(!RetryPolicy::file().jitter());
    }

    #[tokio::test]
    async fn test_succeeds_first_try() {
        let calls = AtomicU32::new(0);
        let result = execute(&quick(3), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>(42)
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let result = execute(&quick(5), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                anyhow::bail!("connection reset by peer");
            }
            Ok(n)
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_attempts() {
        let calls = AtomicU32::new(0);
        let result: CoreResult<()> = execute(&quick(3), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("timeout")
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(CoreError::MaxAttemptsExceeded {
                max_attempts,
                source,
            }) => {
                assert_eq!(max_attempts, 3);
                assert_eq!(source.to_string(), "timeout");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_retryable_short_circuits() {
        let calls = AtomicU32::new(0);
        let policy = quick(5).retry_if(|_| false);
        let result: CoreResult<()> = execute(&policy, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("404 not found")
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result,
            Err(CoreError::NonRetryable { attempt: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_notify_sees_every_failure() {
        let mut seen = Vec::new();
        let result: CoreResult<()> = execute_with_notify(
            &CancellationScope::new(),
            &quick(3),
            || async { anyhow::bail!("flaky") },
            |attempt, _| seen.push(attempt),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_cancelled_scope_runs_nothing() {
        let scope = CancellationScope::new();
        scope.cancel();

        let calls = AtomicU32::new(0);
        let result: CoreResult<()> = execute_with_cancellation(&scope, &quick(3), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<(), anyhow::Error>(())
        })
        .await;

        assert!(matches!(result, Err(CoreError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_wait() {
        let scope = CancellationScope::new();
        let canceller = scope.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let policy = RetryPolicy::new(5, Duration::from_secs(60), Duration::from_secs(60))
            .retry_all();
        let calls = AtomicU32::new(0);
        let result: CoreResult<()> = execute_with_cancellation(&scope, &policy, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("unavailable")
        })
        .await;

        assert!(matches!(result, Err(CoreError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_during_wait() {
        let scope = CancellationScope::with_timeout(Duration::from_millis(100));
        let policy = RetryPolicy::new(5, Duration::from_secs(10), Duration::from_secs(10))
            .retry_all();
        let result: CoreResult<()> =
            execute_with_cancellation(&scope, &policy, || async { anyhow::bail!("busy") }).await;

        assert!(matches!(result, Err(CoreError::DeadlineExceeded)));
    }
}
