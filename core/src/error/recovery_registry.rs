//! Priority-ordered set of recovery strategies.
//!
//! For a given failure the registry picks the highest-priority strategy
//! whose `can_recover` accepts it and runs it under a bounded child scope.
//! Ties keep registration order.

use super::cancellation::CancellationScope;
use super::process_state::{ProcessState, ProcessStatus};
use super::strategies::{
    FileRecovery, NetworkRecovery, RecoveryStrategy, RestartRecovery, RetryRecovery,
};
use crate::settings::RecoverySettings;
use crate::{CoreError, CoreResult};
use std::cmp::Reverse;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub struct RecoveryRegistry {
    strategies: Vec<Arc<dyn RecoveryStrategy>>,
    recovery_timeout: Duration,
}

impl RecoveryRegistry {
    /// Empty registry with a 5 minute recovery timeout
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
            recovery_timeout: Duration::from_secs(300),
        }
    }

    /// Network, file, retry and restart strategies with default settings
    pub fn with_defaults() -> Self {
        Self::from_settings(&RecoverySettings::default())
    }

    pub fn from_settings(settings: &RecoverySettings) -> Self {
        let mut registry =
            Self::new().with_timeout(Duration::from_secs(settings.timeout_secs));
        registry.register(Arc::new(NetworkRecovery::new()));
        registry.register(Arc::new(FileRecovery::new()));
        registry.register(Arc::new(RetryRecovery::new()));
        registry.register(Arc::new(RestartRecovery::from_settings(settings)));
        registry
    }

    pub fn with_timeout(mut self, recovery_timeout: Duration) -> Self {
        self.recovery_timeout = recovery_timeout;
        self
    }

    pub fn recovery_timeout(&self) -> Duration {
        self.recovery_timeout
    }

    /// Add a strategy, replacing any existing one with the same name
    pub fn register(&mut self, strategy: Arc<dyn RecoveryStrategy>) {
        self.strategies
            .retain(|existing| existing.name() != strategy.name());
        tracing::debug!(
            strategy = strategy.name(),
            priority = strategy.priority(),
            "Registered recovery strategy"
        );
        self.strategies.push(strategy);
        // stable: equal priorities keep registration order
        self.strategies.sort_by_key(|s| Reverse(s.priority()));
    }

    /// Remove a strategy by name, returning whether it was present
    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.strategies.len();
        self.strategies.retain(|existing| existing.name() != name);
        self.strategies.len() != before
    }

    /// Strategy names in selection order
    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Highest-priority strategy accepting `error`
    pub fn select(
        &self,
        error: &anyhow::Error,
        state: &ProcessState,
    ) -> Option<&Arc<dyn RecoveryStrategy>> {
        self.strategies
            .iter()
            .find(|strategy| strategy.can_recover(error, state))
    }

    /// Run the selected strategy for `error`.
    ///
    /// On success the item is Running again unless the strategy set another
    /// status, and `last_error` is cleared; on failure it is Failed.
    pub async fn recover(
        &self,
        scope: &CancellationScope,
        error: &anyhow::Error,
        state: &mut ProcessState,
    ) -> CoreResult<()> {
        let message = format!("{error:#}");
        state.status = ProcessStatus::Recovering;
        state.record_error(message.clone());

        let Some(strategy) = self.select(error, state) else {
            tracing::warn!(item = %state.id, error = %message, "No recovery strategy applies");
            state.status = ProcessStatus::Failed;
            return Err(CoreError::NoRecoveryStrategy { error: message });
        };

        tracing::info!(
            item = %state.id,
            strategy = strategy.name(),
            priority = strategy.priority(),
            error = %message,
            "Attempting recovery"
        );

        let bounded = scope.child_with_timeout(self.recovery_timeout);
        match strategy.recover(&bounded, error, state).await {
            Ok(()) => {
                if state.status == ProcessStatus::Recovering {
                    state.status = ProcessStatus::Running;
                }
                state.last_error = None;
                state.touch();
                tracing::info!(item = %state.id, strategy = strategy.name(), "Recovery succeeded");
                Ok(())
            }
            Err(failure) => {
                state.status = if failure.is_cancellation() {
                    ProcessStatus::Cancelled
                } else {
                    ProcessStatus::Failed
                };
                state.last_error = Some(failure.to_string());
                state.touch();
                tracing::warn!(
                    item = %state.id,
                    strategy = strategy.name(),
                    error = %failure,
                    "Recovery failed"
                );
                Err(CoreError::RecoveryFailed {
                    strategy: strategy.name().to_string(),
                    source: Box::new(failure),
                })
            }
        }
    }
}

impl Default for RecoveryRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for RecoveryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryRegistry")
            .field("strategies", &self.strategy_names())
            .field("recovery_timeout", &self.recovery_timeout)
            .finish()
    }
}
