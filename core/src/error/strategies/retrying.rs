use super::{Reattempt, RecoveryStrategy};
use crate::error::cancellation::CancellationScope;
use crate::error::process_state::ProcessState;
use crate::error::retry::{self, BackoffKind, RetryPolicy};
use crate::CoreResult;
use async_trait::async_trait;
use std::time::Duration;

/// Catch-all: replays the item while it still has retry budget.
///
/// Every recovery consumes one unit of `retry_count`, whatever the outcome.
#[derive(Debug, Clone)]
pub struct RetryRecovery {
    policy: RetryPolicy,
    reattempt: Reattempt,
}

impl RetryRecovery {
    /// 3 attempts, 1s to 30s exponential, default predicate
    pub fn new() -> Self {
        Self {
            policy: RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(30))
                .with_backoff(BackoffKind::Exponential),
            reattempt: Reattempt::requeue(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_reattempt(mut self, reattempt: Reattempt) -> Self {
        self.reattempt = reattempt;
        self
    }
}

impl Default for RetryRecovery {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecoveryStrategy for RetryRecovery {
    fn name(&self) -> &str {
        "retry"
    }

    fn priority(&self) -> i32 {
        50
    }

    fn can_recover(&self, _error: &anyhow::Error, state: &ProcessState) -> bool {
        state.retry_count < state.max_retries
    }

    async fn recover(
        &self,
        scope: &CancellationScope,
        _error: &anyhow::Error,
        state: &mut ProcessState,
    ) -> CoreResult<()> {
        tracing::info!(
            item = %state.id,
            retry = state.retry_count + 1,
            max_retries = state.max_retries,
            "Retrying item"
        );

        let outcome = {
            let snapshot: &ProcessState = state;
            retry::execute_with_cancellation(scope, &self.policy, || self.reattempt.run(snapshot))
                .await
        };

        state.retry_count = state.retry_count.saturating_add(1);
        state.touch();
        outcome
    }
}
