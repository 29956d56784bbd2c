use super::WorkItem;
use crate::error::circuit_breaker::{host_key, BreakerRegistry, CircuitBreaker};
use crate::error::{retry, CancellationScope, ProcessState, RecoveryRegistry, RetryPolicy};
use crate::settings::CoreSettings;
use crate::{CoreError, CoreResult};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Arc;

/// Upstream that turns a work item into metadata
#[async_trait]
pub trait MetadataSource: Send + Sync {
    type Output: Send + 'static;

    /// URL or host name used to pick the circuit breaker
    fn host(&self) -> &str;

    async fn fetch(&self, item: &WorkItem) -> anyhow::Result<Self::Output>;
}

/// Final result for one work item
#[derive(Debug)]
pub struct ItemOutcome<T> {
    pub item: WorkItem,
    pub state: ProcessState,
    pub result: CoreResult<T>,
}

impl<T> ItemOutcome<T> {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Host the item was deferred for because its breaker was open
    pub fn deferred_host(&self) -> Option<&str> {
        self.state.data_str("deferred_host")
    }
}

/// Runs work items against a [`MetadataSource`] with bounded concurrency.
///
/// Each fetch goes through the retry policy and the source host's breaker.
/// Failures that survive the retries are handed to the recovery registry and,
/// if it recovers, fetched again, up to `max_recovery_rounds` times.
/// Breaker rejections and non-retryable failures skip recovery entirely.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    policy: RetryPolicy,
    breakers: Arc<BreakerRegistry>,
    recovery: Arc<RecoveryRegistry>,
    concurrency: usize,
    max_recovery_rounds: u32,
}

impl Dispatcher {
    pub fn new(
        policy: RetryPolicy,
        breakers: Arc<BreakerRegistry>,
        recovery: Arc<RecoveryRegistry>,
    ) -> Self {
        Self {
            policy,
            breakers,
            recovery,
            concurrency: num_cpus::get(),
            max_recovery_rounds: 3,
        }
    }

    pub fn from_settings(settings: &CoreSettings) -> Self {
        Self::new(
            RetryPolicy::from_settings(&settings.network),
            Arc::new(BreakerRegistry::from_settings(&settings.breaker)),
            Arc::new(RecoveryRegistry::from_settings(&settings.recovery)),
        )
        .with_concurrency(settings.workers.concurrency)
        .with_max_recovery_rounds(settings.recovery.max_retries)
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_max_recovery_rounds(mut self, rounds: u32) -> Self {
        self.max_recovery_rounds = rounds;
        self
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Process every item; outcomes arrive in completion order
    pub async fn run<S>(
        &self,
        scope: &CancellationScope,
        source: &S,
        items: Vec<WorkItem>,
    ) -> Vec<ItemOutcome<S::Output>>
    where
        S: MetadataSource + ?Sized,
    {
        let breaker = self.breakers.get(&host_key(source.host()));
        tracing::info!(
            items = items.len(),
            concurrency = self.concurrency,
            host = breaker.key(),
            "Dispatching work items"
        );

        let outcomes: Vec<ItemOutcome<S::Output>> = stream::iter(items)
            .map(|item| self.process(scope, source, &breaker, item))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        tracing::info!(
            succeeded,
            failed = outcomes.len() - succeeded,
            "Dispatch finished"
        );
        outcomes
    }

    async fn process<S>(
        &self,
        scope: &CancellationScope,
        source: &S,
        breaker: &CircuitBreaker,
        item: WorkItem,
    ) -> ItemOutcome<S::Output>
    where
        S: MetadataSource + ?Sized,
    {
        let mut state = ProcessState::new(item.id.to_string(), item.identifier.value())
            .with_max_retries(self.max_recovery_rounds)
            .with_data("identifier", item.identifier.value())
            .with_data("main_file", item.main_file().to_string_lossy().into_owned())
            .with_data("parts", item.paths().len());
        let mut rounds = 0;

        let result = loop {
            state.mark_running();

            let item_ref = &item;
            let attempt = retry::execute_with_cancellation(scope, &self.policy, move || {
                breaker.call(move || source.fetch(item_ref))
            })
            .await;

            let error = match attempt {
                Ok(output) => {
                    state.mark_succeeded();
                    tracing::debug!(item = %state.id, identifier = %item.identifier, "Item fetched");
                    break Ok(output);
                }
                Err(error) => error,
            };

            if error.is_cancellation() {
                state.mark_cancelled();
                break Err(error);
            }

            if error.is_circuit_open() {
                state.mark_failed(error.to_string());
                state.set_data("deferred_host", breaker.key());
                tracing::warn!(
                    item = %state.id,
                    host = breaker.key(),
                    "Breaker open, deferring item"
                );
                break Err(error);
            }

            if matches!(error, CoreError::NonRetryable { .. }) {
                state.mark_failed(error.to_string());
                tracing::warn!(item = %state.id, error = %error, "Non-retryable failure");
                break Err(error);
            }

            if rounds >= self.max_recovery_rounds {
                state.mark_failed(error.to_string());
                tracing::warn!(item = %state.id, rounds, error = %error, "Giving up on item");
                break Err(error);
            }
            rounds += 1;

            let failure = anyhow::Error::new(error);
            if let Err(recovery_error) = self.recovery.recover(scope, &failure, &mut state).await {
                break Err(recovery_error);
            }
            tracing::debug!(item = %state.id, round = rounds, "Requeueing recovered item");
        };

        ItemOutcome {
            item,
            state,
            result,
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(
            RetryPolicy::network(),
            Arc::new(BreakerRegistry::default()),
            Arc::new(RecoveryRegistry::default()),
        )
    }
}
