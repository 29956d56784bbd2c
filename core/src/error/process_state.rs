//! Per-item bookkeeping shared between the dispatcher and recovery strategies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Pending,
    Running,
    Recovering,
    Succeeded,
    Failed,
    Cancelled,
}

impl ProcessStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessStatus::Succeeded | ProcessStatus::Failed | ProcessStatus::Cancelled
        )
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessStatus::Pending => "pending",
            ProcessStatus::Running => "running",
            ProcessStatus::Recovering => "recovering",
            ProcessStatus::Succeeded => "succeeded",
            ProcessStatus::Failed => "failed",
            ProcessStatus::Cancelled => "cancelled",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessState {
    pub id: String,
    pub name: String,
    pub status: ProcessStatus,

    /// Recovery rounds consumed so far
    pub retry_count: u32,
    pub max_retries: u32,

    /// Failures recorded over the lifetime of the item
    pub error_count: u32,
    pub last_error: Option<String>,

    /// 0.0 to 1.0
    pub progress: f64,
    pub current_step: String,
    pub total_steps: u32,
    pub completed_steps: u32,

    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Strategy inputs such as `file_path` or `directory_path`
    pub data: Map<String, Value>,
}

impl ProcessState {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            status: ProcessStatus::Pending,
            retry_count: 0,
            max_retries: 3,
            error_count: 0,
            last_error: None,
            progress: 0.0,
            current_step: String::new(),
            total_steps: 0,
            completed_steps: 0,
            started_at: now,
            updated_at: now,
            data: Map::new(),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_steps(mut self, total_steps: u32) -> Self {
        self.total_steps = total_steps;
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn set_data(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
        self.touch();
    }

    /// String value stored under `key`, if any
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn remaining_retries(&self) -> u32 {
        self.max_retries.saturating_sub(self.retry_count)
    }

    pub fn mark_running(&mut self) {
        self.status = ProcessStatus::Running;
        self.touch();
    }

    pub fn mark_succeeded(&mut self) {
        self.status = ProcessStatus::Succeeded;
        self.progress = 1.0;
        if self.total_steps > 0 {
            self.completed_steps = self.total_steps;
        }
        self.touch();
    }

    pub fn mark_cancelled(&mut self) {
        self.status = ProcessStatus::Cancelled;
        self.touch();
    }

    /// Count a failure without changing status
    pub fn record_error(&mut self, error: impl Into<String>) {
        self.error_count = self.error_count.saturating_add(1);
        self.last_error = Some(error.into());
        self.touch();
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.record_error(error);
        self.status = ProcessStatus::Failed;
    }

    /// Move to the next step and refresh progress
    pub fn advance(&mut self, step: impl Into<String>) {
        self.current_step = step.into();
        self.completed_steps = self.completed_steps.saturating_add(1);
        if self.total_steps > 0 {
            self.progress =
                (self.completed_steps.min(self.total_steps) as f64) / (self.total_steps as f64);
        }
        self.touch();
    }

    /// Back to Pending with progress zeroed, consuming one retry
    pub fn reset_for_restart(&mut self) {
        self.status = ProcessStatus::Pending;
        self.progress = 0.0;
        self.completed_steps = 0;
        self.current_step.clear();
        self.last_error = None;
        self.retry_count = self.retry_count.saturating_add(1);
        self.touch();
    }
}

/// Totals over a set of process states
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecoveryStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub recovering: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total_retries: u64,
    pub total_errors: u64,
}

impl RecoveryStats {
    pub fn from_states<'a, I>(states: I) -> Self
    where
        I: IntoIterator<Item = &'a ProcessState>,
    {
        let mut stats = Self::default();
        for state in states {
            stats.total += 1;
            stats.total_retries += u64::from(state.retry_count);
            stats.total_errors += u64::from(state.error_count);
            match state.status {
                ProcessStatus::Pending => stats.pending += 1,
                ProcessStatus::Running => stats.running += 1,
                ProcessStatus::Recovering => stats.recovering += 1,
                ProcessStatus::Succeeded => stats.succeeded += 1,
                ProcessStatus::Failed => stats.failed += 1,
                ProcessStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    /// Fraction of finished items that succeeded
    pub fn success_rate(&self) -> f64 {
        let finished = self.succeeded + self.failed + self.cancelled;
        if finished == 0 {
            0.0
        } else {
            self.succeeded as f64 / finished as f64
        }
    }
}
