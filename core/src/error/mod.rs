//! Failure handling for metadata lookups.
//!
//! Built in layers, bottom to top:
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │   Recovery Registry (priority dispatch)   │
//! └────────────────┬─────────────────────────┘
//!                  │
//!      ┌───────────┴────────────┐
//!      ↓                        ↓
//! ┌──────────────┐       ┌───────────────┐
//! │ Strategies   │       │ Process State │
//! │ network/file │       │  bookkeeping  │
//! │ retry/restart│       └───────────────┘
//! └─────┬────────┘
//!       ↓
//! ┌──────────────────────────────────────────┐
//! │ Retry engine + Circuit breaker            │
//! │ (classification, cancellation scopes)     │
//! └──────────────────────────────────────────┘
//! ```
//!
//! # Usage Example
//!
//! ```rust,ignore
//! use mdc_core::error::{retry, BreakerRegistry, CancellationScope, RetryPolicy};
//!
//! let scope = CancellationScope::with_timeout(Duration::from_secs(30));
//! let breakers = BreakerRegistry::default();
//! let breaker = breakers.for_url("https://www.example.com/search?q=SNIS-829");
//!
//! let body = retry::execute_with_cancellation(&scope, &RetryPolicy::network(), || {
//!     breaker.call(|| fetch_page("SNIS-829"))
//! })
//! .await?;
//! # Ok::<(), mdc_core::CoreError>(())
//! ```

pub mod cancellation;
pub mod circuit_breaker;
pub mod classification;
pub mod process_state;
pub mod recovery_registry;
pub mod retry;
pub mod strategies;

// Re-export main types for convenience
pub use cancellation::CancellationScope;
pub use circuit_breaker::{BreakerRegistry, BreakerSnapshot, CircuitBreaker, CircuitState};
pub use classification::{FaultClass, NetworkFault};
pub use process_state::{ProcessState, ProcessStatus, RecoveryStats};
pub use recovery_registry::RecoveryRegistry;
pub use retry::{BackoffKind, RetryPolicy, RetryPredicate};
pub use strategies::{
    CircuitBreakerRecovery, CompositeRecovery, FileRecovery, NetworkRecovery, Reattempt,
    RecoveryStrategy, RestartRecovery, RetryRecovery, StateHook,
};
