use super::{Reattempt, RecoveryStrategy};
use crate::error::cancellation::CancellationScope;
use crate::error::classification;
use crate::error::process_state::ProcessState;
use crate::error::retry::{self, BackoffKind, RetryPolicy};
use crate::CoreResult;
use async_trait::async_trait;
use std::time::Duration;

/// Waits out connectivity problems by replaying the lookup with backoff
#[derive(Debug, Clone)]
pub struct NetworkRecovery {
    max_attempts: u32,
    retry_interval: Duration,
    max_delay: Duration,
    reattempt: Reattempt,
}

impl NetworkRecovery {
    /// 3 attempts from 5s, capped at 60s
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            retry_interval: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            reattempt: Reattempt::requeue(),
        }
    }

    pub fn with_attempts(mut self, max_attempts: u32, retry_interval: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.retry_interval = retry_interval;
        self
    }

    pub fn with_reattempt(mut self, reattempt: Reattempt) -> Self {
        self.reattempt = reattempt;
        self
    }

    fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.retry_interval, self.max_delay)
            .with_backoff(BackoffKind::Exponential)
            .with_jitter(true)
            .retry_if(classification::network_retry_if)
    }
}

impl Default for NetworkRecovery {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecoveryStrategy for NetworkRecovery {
    fn name(&self) -> &str {
        "network"
    }

    fn priority(&self) -> i32 {
        80
    }

    fn can_recover(&self, error: &anyhow::Error, _state: &ProcessState) -> bool {
        classification::is_network_failure(error)
    }

    async fn recover(
        &self,
        scope: &CancellationScope,
        _error: &anyhow::Error,
        state: &mut ProcessState,
    ) -> CoreResult<()> {
        tracing::info!(
            item = %state.id,
            max_attempts = self.max_attempts,
            interval = %humantime::format_duration(self.retry_interval),
            "Attempting network recovery"
        );

        let snapshot: &ProcessState = state;
        let policy = self.policy();
        retry::execute_with_cancellation(scope, &policy, || self.reattempt.run(snapshot)).await
    }
}
