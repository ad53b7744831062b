use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{MrError, MrResult};

pub const DEFAULT_JOB_NAME: &str = "word count";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 50;
pub const MAX_RETRY_BACKOFF_MS: u64 = 60_000;

fn default_job_name() -> String {
    DEFAULT_JOB_NAME.to_string()
}

fn default_map_workers() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_retry_backoff_ms() -> u64 {
    DEFAULT_RETRY_BACKOFF_MS
}

fn default_use_combiner() -> bool {
    true
}

/// Everything a job needs to know before it is submitted.
///
/// Sizes and counts are signed so that a non-positive value coming from a
/// command line or a config file reaches [`JobConfig::validate`] instead of
/// failing to parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    #[serde(default = "default_job_name")]
    pub job_name: String,
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    /// Upper bound, in bytes, of the input handed to a single map task.
    pub max_split_size: i64,
    pub reducer_count: i64,
    #[serde(default = "default_map_workers")]
    pub map_workers: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_use_combiner")]
    pub use_combiner: bool,
}

impl JobConfig {
    pub fn new(
        inputs: Vec<PathBuf>,
        output: impl Into<PathBuf>,
        max_split_size: i64,
        reducer_count: i64,
    ) -> Self {
        JobConfig {
            job_name: default_job_name(),
            inputs,
            output: output.into(),
            max_split_size,
            reducer_count,
            map_workers: default_map_workers(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            use_combiner: true,
        }
    }

    pub fn from_json_file(path: &Path) -> MrResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| MrError::io(format!("reading config file {}", path.display()), e))?;
        serde_json::from_str(&contents).map_err(|source| MrError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn with_job_name(mut self, name: impl Into<String>) -> Self {
        self.job_name = name.into();
        self
    }

    pub fn with_map_workers(mut self, n: usize) -> Self {
        self.map_workers = n;
        self
    }

    pub fn with_max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn with_retry_backoff_ms(mut self, ms: u64) -> Self {
        self.retry_backoff_ms = ms;
        self
    }

    pub fn with_combiner(mut self, enabled: bool) -> Self {
        self.use_combiner = enabled;
        self
    }

    pub fn validate(&self) -> MrResult<()> {
        if self.max_split_size <= 0 {
            return Err(MrError::InvalidConfiguration(format!(
                "max split size must be positive, got {}",
                self.max_split_size
            )));
        }
        if self.reducer_count <= 0 {
            return Err(MrError::InvalidConfiguration(format!(
                "reducer count must be positive, got {}",
                self.reducer_count
            )));
        }
        if self.map_workers == 0 {
            return Err(MrError::InvalidConfiguration(
                "map worker count must be positive".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(MrError::InvalidConfiguration(
                "max attempts must be positive".to_string(),
            ));
        }
        if self.retry_backoff_ms > MAX_RETRY_BACKOFF_MS {
            return Err(MrError::InvalidConfiguration(format!(
                "retry backoff must be at most {} ms, got {}",
                MAX_RETRY_BACKOFF_MS, self.retry_backoff_ms
            )));
        }
        if self.inputs.is_empty() {
            return Err(MrError::InvalidConfiguration(
                "at least one input location is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Only meaningful after [`JobConfig::validate`] succeeded.
    pub fn split_size(&self) -> usize {
        self.max_split_size.max(1) as usize
    }

    pub fn reducers(&self) -> usize {
        self.reducer_count.max(1) as usize
    }
}
