use super::{Reattempt, RecoveryStrategy};
use crate::error::cancellation::CancellationScope;
use crate::error::circuit_breaker::BreakerRegistry;
use crate::error::classification;
use crate::error::process_state::ProcessState;
use crate::{CoreError, CoreResult};
use async_trait::async_trait;
use std::time::Duration;

/// Replays an item behind a breaker keyed by the item id, so an item that
/// keeps failing stops being retried for a while.
#[derive(Debug)]
pub struct CircuitBreakerRecovery {
    breakers: BreakerRegistry,
    reattempt: Reattempt,
}

impl CircuitBreakerRecovery {
    /// 5 failures, 60 second reset
    pub fn new() -> Self {
        Self::with_thresholds(5, Duration::from_secs(60))
    }

    pub fn with_thresholds(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            breakers: BreakerRegistry::new(failure_threshold, reset_timeout),
            reattempt: Reattempt::requeue(),
        }
    }

    pub fn with_reattempt(mut self, reattempt: Reattempt) -> Self {
        self.reattempt = reattempt;
        self
    }

    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }
}

impl Default for CircuitBreakerRecovery {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecoveryStrategy for CircuitBreakerRecovery {
    fn name(&self) -> &str {
        "circuit_breaker"
    }

    fn priority(&self) -> i32 {
        90
    }

    fn can_recover(&self, error: &anyhow::Error, _state: &ProcessState) -> bool {
        !classification::is_cancellation(error)
    }

    async fn recover(
        &self,
        scope: &CancellationScope,
        _error: &anyhow::Error,
        state: &mut ProcessState,
    ) -> CoreResult<()> {
        let breaker = self.breakers.get(&state.id);
        let snapshot: &ProcessState = state;

        breaker
            .call(|| async {
                scope
                    .run(self.reattempt.run(snapshot))
                    .await
                    .map_err(anyhow::Error::from)?
            })
            .await
            .map_err(CoreError::from_anyhow)
    }
}
