use super::{RecoveryStrategy, StateHook};
use crate::error::cancellation::CancellationScope;
use crate::error::classification;
use crate::error::process_state::ProcessState;
use crate::settings::RecoverySettings;
use crate::{CoreError, CoreResult};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Failures after which the item is started over from scratch
const REPEATED_FAILURES: u32 = 3;

/// Resets an item to Pending after severe or repeated failures
#[derive(Clone)]
pub struct RestartRecovery {
    max_restarts: u32,
    restart_interval: Duration,
    cleanup: Option<StateHook>,
    init: Option<StateHook>,
}

impl RestartRecovery {
    /// 2 restarts, 5 seconds apart
    pub fn new() -> Self {
        Self {
            max_restarts: 2,
            restart_interval: Duration::from_secs(5),
            cleanup: None,
            init: None,
        }
    }

    pub fn from_settings(settings: &RecoverySettings) -> Self {
        Self::new()
            .with_max_restarts(settings.max_restarts)
            .with_interval(Duration::from_secs(settings.restart_interval_secs))
    }

    pub fn with_max_restarts(mut self, max_restarts: u32) -> Self {
        self.max_restarts = max_restarts;
        self
    }

    pub fn with_interval(mut self, restart_interval: Duration) -> Self {
        self.restart_interval = restart_interval;
        self
    }

    pub fn with_cleanup<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut ProcessState) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.cleanup = Some(Arc::new(hook));
        self
    }

    pub fn with_init<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut ProcessState) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.init = Some(Arc::new(hook));
        self
    }
}

impl Default for RestartRecovery {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RestartRecovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestartRecovery")
            .field("max_restarts", &self.max_restarts)
            .field("restart_interval", &self.restart_interval)
            .field("cleanup", &self.cleanup.is_some())
            .field("init", &self.init.is_some())
            .finish()
    }
}

#[async_trait]
impl RecoveryStrategy for RestartRecovery {
    fn name(&self) -> &str {
        "restart"
    }

    fn priority(&self) -> i32 {
        30
    }

    fn can_recover(&self, error: &anyhow::Error, state: &ProcessState) -> bool {
        classification::is_severe(error) || state.error_count >= REPEATED_FAILURES
    }

    async fn recover(
        &self,
        scope: &CancellationScope,
        _error: &anyhow::Error,
        state: &mut ProcessState,
    ) -> CoreResult<()> {
        if state.retry_count >= self.max_restarts {
            return Err(CoreError::RestartLimitExceeded {
                max_restarts: self.max_restarts,
            });
        }

        tracing::warn!(
            item = %state.id,
            restart = state.retry_count + 1,
            max_restarts = self.max_restarts,
            "Restarting item"
        );

        if let Some(cleanup) = &self.cleanup {
            cleanup(&mut *state).map_err(|source| CoreError::Hook {
                stage: "cleanup",
                source,
            })?;
        }

        scope.sleep(self.restart_interval).await?;
        state.reset_for_restart();

        if let Some(init) = &self.init {
            init(&mut *state).map_err(|source| CoreError::Hook {
                stage: "initialization",
                source,
            })?;
        }
        Ok(())
    }
}
