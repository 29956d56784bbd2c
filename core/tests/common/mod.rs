// Common test utilities shared by the integration tests:
// - A scripted metadata source
// - Library listings used as fixtures

#![allow(dead_code)]

pub mod scripted_source;

pub use scripted_source::ScriptedSource;

use std::time::Duration;

/// A small library with one three-part title, one two-part title and
/// three ordinary files, one of them unparsable
pub fn mixed_library() -> Vec<&'static str> {
    vec![
        "/library/SSIS-001-cd2.mp4",
        "/library/ABC-123.mp4",
        "/library/SSIS-001-cd1.mp4",
        "/library/caribean-020317_001.mkv",
        "/library/SSIS-001-cd3.mp4",
        "/library/MIDE-500_part2.mp4",
        "/library/.mp4",
        "/library/MIDE-500_part1.mp4",
    ]
}

/// Retry policy with millisecond delays for tests that run in real time
pub fn fast_policy(max_attempts: u32) -> mdc_core::RetryPolicy {
    mdc_core::RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(4))
}
