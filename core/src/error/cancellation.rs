//! Cancellation scopes carrying an optional deadline.
//!
//! A scope wraps a [`CancellationToken`] so that cancelling a parent
//! cancels every child derived from it. Deadlines are inherited and can
//! only shrink: a child never outlives its parent.

use crate::{CoreError, CoreResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct CancellationScope {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CancellationScope {
    /// Scope that only ends on manual cancellation
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Child scope that is cancelled together with this one
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Child scope whose deadline is the earlier of the parent's and `timeout` from now
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) => parent.min(candidate),
            None => candidate,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True once cancelled or past the deadline
    pub fn is_cancelled(&self) -> bool {
        self.check().is_err()
    }

    /// Fails with `Cancelled` or `DeadlineExceeded` if the scope has ended
    pub fn check(&self) -> CoreResult<()> {
        if self.token.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(CoreError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Resolves when the scope ends, yielding the reason
    pub async fn cancelled(&self) -> CoreError {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => CoreError::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => CoreError::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                CoreError::Cancelled
            }
        }
    }

    /// Sleep for `duration` unless the scope ends first
    pub async fn sleep(&self, duration: Duration) -> CoreResult<()> {
        tokio::select! {
            biased;
            reason = self.cancelled() => Err(reason),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Drive `future` to completion unless the scope ends first
    pub async fn run<F>(&self, future: F) -> CoreResult<F::Output>
    where
        F: Future,
    {
        self.check()?;
        tokio::select! {
            biased;
            reason = self.cancelled() => Err(reason),
            output = future => Ok(output),
        }
    }
}
