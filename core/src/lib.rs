// Allow complex types where needed for dyn-dispatched async hooks
#![allow(clippy::type_complexity)]

pub mod error;
pub mod fragment;
pub mod identifier;
pub mod pipeline;
pub mod settings;

// Re-export the main entry points for convenience
pub use error::{
    BackoffKind, BreakerRegistry, CancellationScope, CircuitBreaker, CircuitState, FaultClass,
    NetworkFault, ProcessState, ProcessStatus, RecoveryRegistry, RecoveryStrategy, RetryPolicy,
};
pub use fragment::{FragmentDetector, FragmentFile, FragmentGroup};
pub use identifier::{normalize, Identifier, IdentifierParser};
pub use pipeline::{plan, Dispatcher, ItemOutcome, MetadataSource, WorkItem, WorkPlan};
pub use settings::CoreSettings;

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the retry, breaker and recovery layers.
///
/// Every variant that wraps a failed operation keeps the original
/// `anyhow::Error` as its source, so callers can tell "gave up after N
/// attempts" from "non-retryable from the start" from "breaker rejected
/// without attempting".
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("non-retryable error after attempt {attempt}: {source:#}")]
    NonRetryable {
        attempt: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("max retry attempts ({max_attempts}) exceeded, last error: {source:#}")]
    MaxAttemptsExceeded {
        max_attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("circuit breaker '{key}' is open - service currently unavailable (retry in {retry_in:?})")]
    CircuitOpen { key: String, retry_in: Duration },

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("no recovery strategy applicable to error: {error}")]
    NoRecoveryStrategy { error: String },

    #[error("recovery via '{strategy}' failed: {source}")]
    RecoveryFailed {
        strategy: String,
        #[source]
        source: Box<CoreError>,
    },

    #[error("all recovery strategies failed for error: {original} ({attempts} attempted)")]
    AllStrategiesFailed { original: String, attempts: usize },

    #[error("maximum restart attempts ({max_restarts}) exceeded")]
    RestartLimitExceeded { max_restarts: u32 },

    #[error("{0} recovery not implemented")]
    Unimplemented(&'static str),

    #[error("unable to recover from file error: {0}")]
    UnrecoverableFile(String),

    #[error("process data has no {0}")]
    MissingProcessData(&'static str),

    #[error("{stage} failed: {source:#}")]
    Hook {
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid identifier pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    Operation(anyhow::Error),
}

impl CoreError {
    /// Recover a `CoreError` that travelled through an `anyhow::Error`,
    /// wrapping anything else as an operation failure.
    pub fn from_anyhow(error: anyhow::Error) -> Self {
        match error.downcast::<CoreError>() {
            Ok(core) => core,
            Err(other) => CoreError::Operation(other),
        }
    }

    /// The wrapped operation error, if this variant carries one
    pub fn operation_error(&self) -> Option<&anyhow::Error> {
        match self {
            CoreError::NonRetryable { source, .. }
            | CoreError::MaxAttemptsExceeded { source, .. }
            | CoreError::Hook { source, .. }
            | CoreError::Operation(source) => Some(source),
            _ => None,
        }
    }

    /// True when a breaker rejected the call, directly or inside a retry outcome
    pub fn is_circuit_open(&self) -> bool {
        match self {
            CoreError::CircuitOpen { .. } => true,
            CoreError::RecoveryFailed { source, .. } => source.is_circuit_open(),
            other => other
                .operation_error()
                .map(error::classification::is_breaker_rejection)
                .unwrap_or(false),
        }
    }

    /// True for manual cancellation or an expired deadline
    pub fn is_cancellation(&self) -> bool {
        match self {
            CoreError::Cancelled | CoreError::DeadlineExceeded => true,
            CoreError::RecoveryFailed { source, .. } => source.is_cancellation(),
            other => other
                .operation_error()
                .map(error::classification::is_cancellation)
                .unwrap_or(false),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
