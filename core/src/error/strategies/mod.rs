//! Recovery strategies selected by the [`RecoveryRegistry`](super::RecoveryRegistry).
//!
//! Each strategy reports whether it applies to an error and, if it does,
//! tries to bring the item back into a state where it can be dispatched
//! again. A strategy returning `Ok(())` means "requeue the item".

pub mod breaker;
pub mod composite;
pub mod file;
pub mod network;
pub mod restart;
pub mod retrying;

pub use breaker::CircuitBreakerRecovery;
pub use composite::CompositeRecovery;
pub use file::FileRecovery;
pub use network::NetworkRecovery;
pub use restart::RestartRecovery;
pub use retrying::RetryRecovery;

use super::cancellation::CancellationScope;
use super::process_state::ProcessState;
use crate::CoreResult;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

#[async_trait]
pub trait RecoveryStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Higher runs first
    fn priority(&self) -> i32;

    fn can_recover(&self, error: &anyhow::Error, state: &ProcessState) -> bool;

    async fn recover(
        &self,
        scope: &CancellationScope,
        error: &anyhow::Error,
        state: &mut ProcessState,
    ) -> CoreResult<()>;
}

/// Operation a strategy replays to check whether the failure has cleared
#[derive(Clone)]
pub struct Reattempt(Arc<dyn Fn(&ProcessState) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>);

impl Reattempt {
    pub fn new<F, Fut>(operation: F) -> Self
    where
        F: Fn(&ProcessState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self(Arc::new(move |state| Box::pin(operation(state))))
    }

    /// Succeeds immediately, leaving the real retry to the next dispatch round
    pub fn requeue() -> Self {
        Self::new(|_| async { Ok::<(), anyhow::Error>(()) })
    }

    pub fn run(&self, state: &ProcessState) -> BoxFuture<'static, anyhow::Result<()>> {
        (self.0)(state)
    }
}

impl Default for Reattempt {
    fn default() -> Self {
        Self::requeue()
    }
}

impl fmt::Debug for Reattempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Reattempt")
    }
}

/// Cleanup or initialization step run around a restart
pub type StateHook = Arc<dyn Fn(&mut ProcessState) -> anyhow::Result<()> + Send + Sync>;
