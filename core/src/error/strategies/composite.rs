use super::RecoveryStrategy;
use crate::error::cancellation::CancellationScope;
use crate::error::process_state::ProcessState;
use crate::{CoreError, CoreResult};
use async_trait::async_trait;
use std::sync::Arc;

/// Tries its children in order, stopping at the first success
pub struct CompositeRecovery {
    name: String,
    priority: i32,
    strategies: Vec<Arc<dyn RecoveryStrategy>>,
}

impl CompositeRecovery {
    pub fn new(name: impl Into<String>, priority: i32) -> Self {
        Self {
            name: name.into(),
            priority,
            strategies: Vec::new(),
        }
    }

    pub fn with(mut self, strategy: Arc<dyn RecoveryStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

#[async_trait]
impl RecoveryStrategy for CompositeRecovery {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn can_recover(&self, error: &anyhow::Error, state: &ProcessState) -> bool {
        self.strategies
            .iter()
            .any(|strategy| strategy.can_recover(error, state))
    }

    async fn recover(
        &self,
        scope: &CancellationScope,
        error: &anyhow::Error,
        state: &mut ProcessState,
    ) -> CoreResult<()> {
        let mut attempts = 0;

        for strategy in &self.strategies {
            if !strategy.can_recover(error, state) {
                continue;
            }
            attempts += 1;

            match strategy.recover(scope, error, state).await {
                Ok(()) => return Ok(()),
                Err(failure) if failure.is_cancellation() => return Err(failure),
                Err(failure) => {
                    tracing::debug!(
                        composite = %self.name,
                        strategy = strategy.name(),
                        error = %failure,
                        "Child strategy failed"
                    );
                }
            }
        }

        Err(CoreError::AllStrategiesFailed {
            original: format!("{error:#}"),
            attempts,
        })
    }
}
