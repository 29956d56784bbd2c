use super::RecoveryStrategy;
use crate::error::cancellation::CancellationScope;
use crate::error::classification::{self, chain_text, io_kind};
use crate::error::process_state::ProcessState;
use crate::error::retry::{self, BackoffKind, RetryPolicy};
use crate::{CoreError, CoreResult};
use anyhow::Context;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

const FILE_MARKERS: &[&str] = &[
    "file",
    "directory",
    "permission",
    "access denied",
    "disk",
    "no space",
    "path",
    "locked",
    "busy",
];

const MISSING_MARKERS: &[&str] = &["no such file or directory", "directory not found", "file not found"];
const PERMISSION_MARKERS: &[&str] = &["permission denied", "access denied"];
const SPACE_MARKERS: &[&str] = &["no space left", "disk full"];
const LOCK_MARKERS: &[&str] = &["locked", "sharing violation", "resource busy", "in use"];

/// Repairs filesystem conditions around an item's output location
#[derive(Debug, Clone)]
pub struct FileRecovery {
    create_dirs: bool,
    lock_policy: RetryPolicy,
}

impl FileRecovery {
    /// Creates missing directories; waits up to 10 linear steps of 500ms to 5s for locks
    pub fn new() -> Self {
        Self {
            create_dirs: true,
            lock_policy: RetryPolicy::new(10, Duration::from_millis(500), Duration::from_secs(5))
                .with_backoff(BackoffKind::Linear)
                .retry_if(classification::file_retry_if),
        }
    }

    pub fn with_create_dirs(mut self, create_dirs: bool) -> Self {
        self.create_dirs = create_dirs;
        self
    }

    pub fn with_lock_policy(mut self, policy: RetryPolicy) -> Self {
        self.lock_policy = policy;
        self
    }

    async fn create_missing_directories(&self, state: &ProcessState) -> CoreResult<()> {
        let directory = directory_for(state).ok_or(CoreError::MissingProcessData(
            "directory_path or file_path",
        ))?;

        tracing::info!(directory = %directory.display(), "Creating missing directory");
        tokio::fs::create_dir_all(&directory).await?;
        Ok(())
    }

    async fn wait_for_unlock(
        &self,
        scope: &CancellationScope,
        state: &ProcessState,
    ) -> CoreResult<()> {
        let path = state
            .data_str("file_path")
            .map(PathBuf::from)
            .ok_or(CoreError::MissingProcessData("file_path"))?;

        tracing::info!(
            file = %path.display(),
            max_attempts = self.lock_policy.max_attempts(),
            "Waiting for file lock to clear"
        );

        retry::execute_with_cancellation(scope, &self.lock_policy, || open_read_write(&path)).await
    }
}

impl Default for FileRecovery {
    fn default() -> Self {
        Self::new()
    }
}

fn directory_for(state: &ProcessState) -> Option<PathBuf> {
    if let Some(directory) = state.data_str("directory_path") {
        return Some(PathBuf::from(directory));
    }
    state
        .data_str("file_path")
        .and_then(|file| Path::new(file).parent())
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

async fn open_read_write(path: &Path) -> anyhow::Result<()> {
    tokio::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .await
        .with_context(|| format!("file still locked: {}", path.display()))?;
    Ok(())
}

fn mentions(text: &str, markers: &[&str]) -> bool {
    markers.iter().any(|marker| text.contains(marker))
}

#[async_trait]
impl RecoveryStrategy for FileRecovery {
    fn name(&self) -> &str {
        "file"
    }

    fn priority(&self) -> i32 {
        70
    }

    fn can_recover(&self, error: &anyhow::Error, _state: &ProcessState) -> bool {
        if classification::is_breaker_rejection(error) || classification::is_cancellation(error) {
            return false;
        }
        if matches!(
            io_kind(error),
            Some(ErrorKind::NotFound | ErrorKind::PermissionDenied | ErrorKind::AlreadyExists)
        ) {
            return true;
        }
        mentions(&chain_text(error), FILE_MARKERS)
    }

    async fn recover(
        &self,
        scope: &CancellationScope,
        error: &anyhow::Error,
        state: &mut ProcessState,
    ) -> CoreResult<()> {
        let text = chain_text(error);
        let kind = io_kind(error);

        let missing = kind == Some(ErrorKind::NotFound) || mentions(&text, MISSING_MARKERS);
        if missing && self.create_dirs {
            return self.create_missing_directories(state).await;
        }

        if kind == Some(ErrorKind::PermissionDenied) || mentions(&text, PERMISSION_MARKERS) {
            return Err(CoreError::Unimplemented("permission error"));
        }

        if mentions(&text, SPACE_MARKERS) {
            return Err(CoreError::Unimplemented("disk space error"));
        }

        if kind == Some(ErrorKind::WouldBlock) || mentions(&text, LOCK_MARKERS) {
            return self.wait_for_unlock(scope, state).await;
        }

        Err(CoreError::UnrecoverableFile(format!("{error:#}")))
    }
}
