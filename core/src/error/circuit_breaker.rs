//! Circuit breaker keyed per remote host.
//!
//! States:
//! - Closed: calls pass through, consecutive failures are counted
//! - Open: calls are rejected with `CircuitOpen` until the reset timeout elapses
//! - HalfOpen: a single probe call is admitted; its outcome closes or reopens
//!
//! The Open to HalfOpen transition happens lazily on the first call after
//! the reset timeout, so no background timer is needed.

use crate::settings::BreakerSettings;
use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    next_attempt_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Point-in-time view of one breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub key: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    /// Time left before a probe is admitted, when open
    pub retry_in: Option<Duration>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    key: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(key: impl Into<String>, failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            key: key.into(),
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                next_attempt_at: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn reset_timeout(&self) -> Duration {
        self.reset_timeout
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `operation` through the breaker.
    ///
    /// Rejections are returned as `CoreError::CircuitOpen` inside the
    /// `anyhow::Error`, without invoking `operation`.
    pub async fn call<T, F, Fut>(&self, operation: F) -> anyhow::Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut permit = self.admit()?;
        let outcome = operation().await;
        permit.settle(outcome.is_ok());
        outcome
    }

    fn admit(&self) -> Result<Permit<'_>, CoreError> {
        let mut inner = self.lock();
        let now = Instant::now();

        match inner.state {
            CircuitState::Closed => Ok(Permit::new(self, false)),
            CircuitState::Open => {
                let due = inner.next_attempt_at.unwrap_or(now);
                if now >= due {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    tracing::info!(key = %self.key, "Circuit breaker transitioning to HalfOpen");
                    Ok(Permit::new(self, true))
                } else {
                    Err(CoreError::CircuitOpen {
                        key: self.key.clone(),
                        retry_in: due - now,
                    })
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    Err(CoreError::CircuitOpen {
                        key: self.key.clone(),
                        retry_in: Duration::ZERO,
                    })
                } else {
                    inner.probe_in_flight = true;
                    Ok(Permit::new(self, true))
                }
            }
        }
    }

    fn record(&self, success: bool, probe: bool) {
        let mut inner = self.lock();

        if probe {
            inner.probe_in_flight = false;
            if inner.state == CircuitState::HalfOpen {
                if success {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.next_attempt_at = None;
                    tracing::info!(key = %self.key, "Circuit breaker CLOSED after successful probe");
                } else {
                    inner.state = CircuitState::Open;
                    inner.failure_count = inner.failure_count.saturating_add(1);
                    inner.next_attempt_at = Some(Instant::now() + self.reset_timeout);
                    tracing::warn!(
                        key = %self.key,
                        reset_timeout = %humantime::format_duration(self.reset_timeout),
                        "Circuit breaker REOPENED after failure in HalfOpen state"
                    );
                }
                return;
            }
        }

        match (inner.state, success) {
            (CircuitState::Closed, true) => inner.failure_count = 0,
            (CircuitState::Closed, false) => {
                inner.failure_count = inner.failure_count.saturating_add(1);
                if inner.failure_count >= self.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.next_attempt_at = Some(Instant::now() + self.reset_timeout);
                    tracing::warn!(
                        key = %self.key,
                        failures = inner.failure_count,
                        reset_timeout = %humantime::format_duration(self.reset_timeout),
                        "Circuit breaker OPENED"
                    );
                }
            }
            // Late result from a call admitted before the breaker opened
            (_, false) => inner.failure_count = inner.failure_count.saturating_add(1),
            (_, true) => {}
        }
    }

    /// Abandoned probe: allow another one without changing state
    fn release_probe(&self) {
        self.lock().probe_in_flight = false;
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        let retry_in = match inner.state {
            CircuitState::Open => inner
                .next_attempt_at
                .map(|at| at.saturating_duration_since(Instant::now())),
            _ => None,
        };
        BreakerSnapshot {
            key: self.key.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            failure_threshold: self.failure_threshold,
            retry_in,
        }
    }

    /// Force the breaker back to Closed
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.next_attempt_at = None;
        inner.probe_in_flight = false;
        tracing::info!(key = %self.key, "Circuit breaker manually reset to CLOSED");
    }
}

/// Admission ticket; a probe dropped before settling frees the probe slot
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, probe: bool) -> Self {
        Self {
            breaker,
            probe,
            settled: false,
        }
    }

    fn settle(&mut self, success: bool) {
        self.settled = true;
        self.breaker.record(success, self.probe);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.probe {
            self.breaker.release_probe();
        }
    }
}

/// Breakers created on demand, one per key
#[derive(Debug)]
pub struct BreakerRegistry {
    failure_threshold: u32,
    reset_timeout: Duration,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            reset_timeout,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_settings(settings: &BreakerSettings) -> Self {
        Self::new(
            settings.failure_threshold,
            Duration::from_secs(settings.reset_timeout_secs),
        )
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<CircuitBreaker>>> {
        self.breakers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Breaker for `key`, created closed on first use
    pub fn get(&self, key: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.lock();
        if let Some(existing) = breakers.get(key) {
            return Arc::clone(existing);
        }
        let breaker = Arc::new(CircuitBreaker::new(
            key,
            self.failure_threshold,
            self.reset_timeout,
        ));
        breakers.insert(key.to_string(), Arc::clone(&breaker));
        breaker
    }

    /// Breaker for the host part of `url`
    pub fn for_url(&self, url: &str) -> Arc<CircuitBreaker> {
        self.get(&host_key(url))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshots of every breaker, sorted by key
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let breakers: Vec<Arc<CircuitBreaker>> = self.lock().values().cloned().collect();
        let mut snapshots: Vec<BreakerSnapshot> =
            breakers.iter().map(|breaker| breaker.snapshot()).collect();
        snapshots.sort_by(|a, b| a.key.cmp(&b.key));
        snapshots
    }

    pub fn reset_all(&self) {
        let breakers: Vec<Arc<CircuitBreaker>> = self.lock().values().cloned().collect();
        for breaker in breakers {
            breaker.reset();
        }
    }
}

impl Default for BreakerRegistry {
    /// 5 consecutive failures, 60 second reset
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60))
    }
}

/// Lowercased host of `url`, without scheme, credentials or port.
/// Input without a scheme is treated as a bare host.
pub fn host_key(url: &str) -> String {
    let rest = url.trim();
    let rest = rest.split_once("://").map_or(rest, |(_, tail)| tail);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority
        .rsplit_once('@')
        .map_or(authority, |(_, host)| host);

    let host = if let Some(bracketed) = host_port.strip_prefix('[') {
        bracketed.split(']').next().unwrap_or_default()
    } else {
        host_port.split(':').next().unwrap_or_default()
    };

    host.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicU32, Ordering};

    async fn fail(cb: &CircuitBreaker) -> anyhow::Result<()> {
        cb.call(|| async { Err::<(), _>(anyhow!("failure")) }).await
    }

    async fn succeed(cb: &CircuitBreaker) -> anyhow::Result<u32> {
        cb.call(|| async { Ok::<_, anyhow::Error>(42) }).await
    }

    #[tokio::test]
    async fn test_closed_state_passes_through() {
        let cb = CircuitBreaker::new("host", 3, Duration::from_secs(1));
        assert_eq!(succeed(&cb).await.unwrap(), 42);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let cb = CircuitBreaker::new("host", 3, Duration::from_secs(1));
        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        assert_eq!(cb.failure_count(), 2);

        succeed(&cb).await.unwrap();
        assert_eq!(cb.failure_count(), 0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_opens_after_threshold() {
        let cb = CircuitBreaker::new("host", 3, Duration::from_secs(30));
        for _ in 0..3 {
            let _ = fail(&cb).await;
        }
        assert!(cb.is_open());

        let calls = AtomicU32::new(0);
        let result = cb
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(())
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CoreError>(),
            Some(CoreError::CircuitOpen { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_closes() {
        let cb = CircuitBreaker::new("host", 2, Duration::from_millis(100));
        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        assert!(cb.is_open());

        tokio::time::advance(Duration::from_millis(150)).await;

        assert_eq!(succeed(&cb).await.unwrap(), 42);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_failure_reopens() {
        let cb = CircuitBreaker::new("host", 1, Duration::from_millis(100));
        let _ = fail(&cb).await;
        tokio::time::advance(Duration::from_millis(100)).await;

        let _ = fail(&cb).await;
        assert!(cb.is_open());

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.retry_in, Some(Duration::from_millis(100)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_single_probe() {
        let cb = Arc::new(CircuitBreaker::new("host", 1, Duration::from_millis(10)));
        let _ = fail(&cb).await;
        tokio::time::advance(Duration::from_millis(10)).await;

        let (release, wait) = tokio::sync::oneshot::channel::<()>();
        let probe = {
            let cb = Arc::clone(&cb);
            tokio::spawn(async move {
                cb.call(move || async move {
                    let _ = wait.await;
                    Ok::<_, anyhow::Error>(())
                })
                .await
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let rejected = succeed(&cb).await;
        assert!(rejected.is_err());

        release.send(()).unwrap();
        probe.await.unwrap().unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_reset() {
        let cb = CircuitBreaker::new("host", 1, Duration::from_secs(60));
        let _ = fail(&cb).await;
        assert!(cb.is_open());

        cb.reset();
        assert!(!cb.is_open());
        assert!(succeed(&cb).await.is_ok());
    }

    #[test]
    fn test_registry_shares_breakers_per_host() {
        let registry = BreakerRegistry::new(2, Duration::from_secs(5));
        let a = registry.for_url("https://www.Example.com/search?q=SNIS-829");
        let b = registry.for_url("http://user@www.example.com:8080/other");
        let c = registry.for_url("https://other.org/");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 2);
        assert_eq!(a.key(), "www.example.com");
    }

    #[test]
    fn test_host_key() {
        assert_eq!(host_key("https://www.javbus.com/SNIS-829"), "www.javbus.com");
        assert_eq!(host_key("javdb.com"), "javdb.com");
        assert_eq!(host_key("http://[::1]:8080/x"), "::1");
        assert_eq!(host_key("https://a.b.c?x=1"), "a.b.c");
    }

    #[tokio::test]
    async fn test_registry_snapshot_sorted() {
        let registry = BreakerRegistry::default();
        let _ = fail(&registry.get("zeta")).await;
        registry.get("alpha");

        let snapshots = registry.snapshot();
        let keys: Vec<&str> = snapshots.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["alpha", "zeta"]);
        assert_eq!(snapshots[1].failure_count, 1);

        registry.reset_all();
        assert_eq!(registry.get("zeta").failure_count(), 0);
    }
}
