//! Error classification for retry and recovery decisions.
//!
//! Classification looks at three things, in order: typed errors anywhere in
//! the `anyhow` chain (`CoreError`, [`NetworkFault`], `std::io::Error`), then
//! the lowercased text of the whole chain. Breaker rejections and
//! cancellations are never retryable.

use crate::CoreError;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind;
use thiserror::Error;

/// Failure taxonomy used in logs and recovery selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaultClass {
    /// No identifier could be derived from a filename
    Unparsable,

    /// Fragment suffix found but the part number is unusable
    MalformedFragment,

    /// Timeouts, refused or reset connections, busy resources
    Transient,

    /// Client errors and anything the predicates do not recognise
    NonRetryable,

    /// Process-level breakage: panics, fatal errors, corruption
    Severe,

    /// Rejected by an open circuit breaker without attempting
    BreakerOpen,

    /// Manual cancellation or expired deadline
    Cancelled,
}

impl FaultClass {
    /// Classify an operation error
    pub fn of(error: &anyhow::Error) -> Self {
        if is_cancellation(error) {
            FaultClass::Cancelled
        } else if is_breaker_rejection(error) {
            FaultClass::BreakerOpen
        } else if is_severe(error) {
            FaultClass::Severe
        } else if network_retry_if(error) || file_retry_if(error) || default_retry_if(error) {
            FaultClass::Transient
        } else {
            FaultClass::NonRetryable
        }
    }

    /// Classify a retry or recovery outcome
    pub fn of_outcome(error: &CoreError) -> Self {
        match error {
            CoreError::CircuitOpen { .. } => FaultClass::BreakerOpen,
            CoreError::Cancelled | CoreError::DeadlineExceeded => FaultClass::Cancelled,
            CoreError::NonRetryable { source, .. } => match Self::of(source) {
                FaultClass::Transient => FaultClass::NonRetryable,
                other => other,
            },
            CoreError::MaxAttemptsExceeded { .. } => FaultClass::Transient,
            CoreError::RestartLimitExceeded { .. } => FaultClass::Severe,
            CoreError::RecoveryFailed { source, .. } => Self::of_outcome(source),
            CoreError::Operation(source) | CoreError::Hook { source, .. } => Self::of(source),
            _ => FaultClass::NonRetryable,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            FaultClass::Unparsable => "No identifier could be derived",
            FaultClass::MalformedFragment => "Fragment suffix with unusable part number",
            FaultClass::Transient => "Temporary failure that may resolve on retry",
            FaultClass::NonRetryable => "Failure that retrying will not fix",
            FaultClass::Severe => "Process-level failure that needs a restart",
            FaultClass::BreakerOpen => "Remote host temporarily disabled",
            FaultClass::Cancelled => "Operation cancelled or out of time",
        }
    }

    pub fn allows_retry(&self) -> bool {
        matches!(self, FaultClass::Transient)
    }
}

impl fmt::Display for FaultClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaultClass::Unparsable => "Unparsable",
            FaultClass::MalformedFragment => "MalformedFragment",
            FaultClass::Transient => "Transient",
            FaultClass::NonRetryable => "NonRetryable",
            FaultClass::Severe => "Severe",
            FaultClass::BreakerOpen => "BreakerOpen",
            FaultClass::Cancelled => "Cancelled",
        };
        write!(f, "{name}")
    }
}

/// Typed network failure for sources that know more than an error string
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct NetworkFault {
    pub message: String,
    pub status: Option<u16>,
    pub timeout: bool,
    pub temporary: bool,
}

impl NetworkFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            timeout: false,
            temporary: false,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            timeout: true,
            ..Self::new(message)
        }
    }

    pub fn temporary(message: impl Into<String>) -> Self {
        Self {
            temporary: true,
            ..Self::new(message)
        }
    }

    /// HTTP status failure
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            ..Self::new(message)
        }
    }

    /// None when the fault says nothing either way
    fn retryable(&self) -> Option<bool> {
        match self.status {
            Some(429) => return Some(true),
            Some(code) if (500..600).contains(&code) => return Some(true),
            Some(code) if (400..500).contains(&code) => return Some(false),
            _ => {}
        }
        if self.timeout || self.temporary {
            Some(true)
        } else {
            None
        }
    }
}

lazy_static! {
    static ref RETRYABLE_STATUS: Regex =
        Regex::new(r"\b(5\d{2}|429)\b").expect("valid status pattern");
    static ref CLIENT_STATUS: Regex = Regex::new(r"\b4\d{2}\b").expect("valid status pattern");
}

const TRANSIENT_PHRASES: &[&str] = &[
    "timeout",
    "timed out",
    "connection refused",
    "connection reset",
    "temporary failure",
    "temporarily unavailable",
    "too many requests",
    "service unavailable",
    "rate limit",
    "try again",
];

const NETWORK_PHRASES: &[&str] = &[
    "connection aborted",
    "broken pipe",
    "network is unreachable",
    "network unreachable",
    "host unreachable",
    "no route to host",
    "bad gateway",
    "gateway timeout",
    "no such host",
    "dial tcp",
    "dial udp",
    "dns",
    "eof",
];

const CONNECTIVITY_PHRASES: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection timeout",
    "network unreachable",
    "host unreachable",
    "no route to host",
    "timeout",
    "dial tcp",
    "dial udp",
    "dns",
    "temporary failure",
    "service unavailable",
    "bad gateway",
    "gateway timeout",
];

const MISSING_PATH_PHRASES: &[&str] = &[
    "no such file",
    "not found",
    "does not exist",
    "invalid path",
    "invalid argument",
    "invalid filename",
];

const FILE_CONTENTION_PHRASES: &[&str] = &[
    "resource busy",
    "device or resource busy",
    "file is locked",
    "locked",
    "sharing violation",
    "resource temporarily unavailable",
    "permission denied",
    "access denied",
    "no space left",
    "disk full",
    "too many open files",
];

const SEVERE_PHRASES: &[&str] = &[
    "panic",
    "fatal",
    "out of memory",
    "stack overflow",
    "segmentation fault",
    "corrupted",
    "corruption",
    "deadlock",
];

/// Lowercased text of the full error chain
pub(crate) fn chain_text(error: &anyhow::Error) -> String {
    format!("{error:#}").to_lowercase()
}

fn contains_any(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|phrase| text.contains(phrase))
}

pub(crate) fn io_kind(error: &anyhow::Error) -> Option<ErrorKind> {
    error.chain().find_map(|cause| {
        cause
            .downcast_ref::<std::io::Error>()
            .map(std::io::Error::kind)
            .or_else(|| match cause.downcast_ref::<CoreError>() {
                Some(CoreError::IoError(io)) => Some(io.kind()),
                _ => None,
            })
    })
}

fn network_fault(error: &anyhow::Error) -> Option<&NetworkFault> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<NetworkFault>())
}

fn core_errors(error: &anyhow::Error) -> impl Iterator<Item = &CoreError> {
    error
        .chain()
        .filter_map(|cause| cause.downcast_ref::<CoreError>())
}

/// True when a circuit breaker rejected the call
pub fn is_breaker_rejection(error: &anyhow::Error) -> bool {
    core_errors(error).any(|e| matches!(e, CoreError::CircuitOpen { .. }))
}

/// True for cancellation or an expired deadline
pub fn is_cancellation(error: &anyhow::Error) -> bool {
    core_errors(error).any(|e| matches!(e, CoreError::Cancelled | CoreError::DeadlineExceeded))
}

fn is_never_retryable(error: &anyhow::Error) -> bool {
    is_breaker_rejection(error) || is_cancellation(error)
}

/// Process-level failure calling for a restart
pub fn is_severe(error: &anyhow::Error) -> bool {
    contains_any(&chain_text(error), SEVERE_PHRASES)
}

/// Connectivity failure worth waiting out: flagged faults, network io
/// kinds or connection phrases. Client errors are not.
pub fn is_network_failure(error: &anyhow::Error) -> bool {
    if is_never_retryable(error) {
        return false;
    }

    if let Some(fault) = network_fault(error) {
        if fault.timeout || fault.temporary {
            return true;
        }
        if let Some(code) = fault.status {
            return code == 429 || (500..600).contains(&code);
        }
    }

    if matches!(
        io_kind(error),
        Some(
            ErrorKind::TimedOut
                | ErrorKind::ConnectionRefused
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::NotConnected
                | ErrorKind::AddrNotAvailable
                | ErrorKind::BrokenPipe
        )
    ) {
        return true;
    }

    contains_any(&chain_text(error), CONNECTIVITY_PHRASES)
}

/// Generic transient failures
pub fn default_retry_if(error: &anyhow::Error) -> bool {
    if is_never_retryable(error) {
        return false;
    }

    if let Some(fault) = network_fault(error) {
        if let Some(verdict) = fault.retryable() {
            return verdict;
        }
    }

    if matches!(
        io_kind(error),
        Some(
            ErrorKind::TimedOut
                | ErrorKind::ConnectionRefused
                | ErrorKind::ConnectionReset
                | ErrorKind::Interrupted
                | ErrorKind::WouldBlock
        )
    ) {
        return true;
    }

    contains_any(&chain_text(error), TRANSIENT_PHRASES)
}

/// Transient network failures; 4xx client errors other than 429 are final
pub fn network_retry_if(error: &anyhow::Error) -> bool {
    if is_never_retryable(error) {
        return false;
    }

    if let Some(fault) = network_fault(error) {
        if let Some(verdict) = fault.retryable() {
            return verdict;
        }
    }

    if matches!(
        io_kind(error),
        Some(
            ErrorKind::TimedOut
                | ErrorKind::ConnectionRefused
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::NotConnected
                | ErrorKind::AddrNotAvailable
                | ErrorKind::BrokenPipe
                | ErrorKind::UnexpectedEof
        )
    ) {
        return true;
    }

    let text = chain_text(error);
    if RETRYABLE_STATUS.is_match(&text) {
        return true;
    }
    if CLIENT_STATUS.is_match(&text) {
        return false;
    }

    contains_any(&text, TRANSIENT_PHRASES) || contains_any(&text, NETWORK_PHRASES)
}

/// Lock, busy, space and permission failures; missing paths are final
pub fn file_retry_if(error: &anyhow::Error) -> bool {
    if is_never_retryable(error) {
        return false;
    }

    match io_kind(error) {
        Some(ErrorKind::NotFound | ErrorKind::InvalidInput) => return false,
        Some(ErrorKind::PermissionDenied | ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
            return true
        }
        _ => {}
    }

    let text = chain_text(error);
    if contains_any(&text, MISSING_PATH_PHRASES) {
        return false;
    }

    contains_any(&text, FILE_CONTENTION_PHRASES)
}
