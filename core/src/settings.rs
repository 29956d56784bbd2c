//! Layered configuration.
//!
//! Sources, lowest precedence first: built-in defaults, an optional TOML
//! file, then `MDC_` environment variables using `__` between sections
//! (`MDC_NETWORK__RETRY_COUNT=5`).

use crate::identifier::validator;
use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreSettings {
    pub parser: ParserSettings,
    pub network: NetworkSettings,
    pub workers: WorkerSettings,
    pub breaker: BreakerSettings,
    pub recovery: RecoverySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserSettings {
    /// Whitespace-separated regexes tried before the built-in rules
    pub custom_number_patterns: String,

    /// Comma-separated identifier prefixes always treated as uncensored
    pub uncensored_prefixes: String,
}

impl Default for ParserSettings {
    fn default() -> Self {
        Self {
            custom_number_patterns: String::new(),
            uncensored_prefixes: "S2M,BT,LAF,SMD".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub retry_count: u32,
    pub timeout_seconds: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            retry_count: 3,
            timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub concurrency: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: num_cpus::get(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub reset_timeout_secs: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    /// Upper bound on a single recovery attempt
    pub timeout_secs: u64,
    pub max_restarts: u32,
    pub restart_interval_secs: u64,
    /// Recovery rounds per work item
    pub max_retries: u32,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            max_restarts: 2,
            restart_interval_secs: 5,
            max_retries: 3,
        }
    }
}

impl CoreSettings {
    pub const ENV_PREFIX: &'static str = "MDC";

    /// Load settings from `path`, or the default location when `None`.
    /// A missing file is not an error.
    pub fn load(path: Option<&Path>) -> CoreResult<Self> {
        let mut builder = config::Config::builder();

        if let Some(file) = path.map(Path::to_path_buf).or_else(Self::default_path) {
            tracing::debug!(path = %file.display(), "Reading settings file");
            builder = builder.add_source(config::File::from(file).required(false));
        }

        let settings: CoreSettings = builder
            .add_source(
                config::Environment::with_prefix(Self::ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// `<config dir>/mdc/core.toml` for the current platform
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "mdc")
            .map(|dirs| dirs.config_dir().join("core.toml"))
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.network.timeout_seconds == 0 {
            return Err(CoreError::InvalidSettings(
                "network.timeout_seconds must be positive".to_string(),
            ));
        }
        if self.workers.concurrency == 0 {
            return Err(CoreError::InvalidSettings(
                "workers.concurrency must be at least 1".to_string(),
            ));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(CoreError::InvalidSettings(
                "breaker.failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.recovery.timeout_secs == 0 {
            return Err(CoreError::InvalidSettings(
                "recovery.timeout_secs must be positive".to_string(),
            ));
        }

        // Invalid custom patterns are skipped at runtime; report them here
        validator::validate_patterns(&self.parser.custom_number_patterns)
    }
}
