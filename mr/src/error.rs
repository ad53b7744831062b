use std::path::PathBuf;
use thiserror::Error;

pub type MrResult<T> = Result<T, MrError>;

/// Job-fatal errors. Any of these aborts the whole job and leaves no output behind.
#[derive(Debug, Error)]
pub enum MrError {
    #[error("input not found: {location}")]
    InputNotFound { location: String },

    #[error("output already exists: {location}")]
    OutputAlreadyExists { location: String },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("{task} failed after {attempts} attempt(s): {reason}")]
    WorkerFailure {
        task: String,
        attempts: u32,
        reason: String,
    },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config file {path:?}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl MrError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        MrError::Io {
            context: context.into(),
            source,
        }
    }
}

/// Outcome of a single failed attempt at a map or reduce task.
#[derive(Debug, Error)]
pub enum AttemptError {
    /// Retried until the task runs out of attempts.
    #[error("{0}")]
    Failed(String),

    /// The job is being torn down; never retried.
    #[error("cancelled")]
    Cancelled,
}

impl From<std::io::Error> for AttemptError {
    fn from(e: std::io::Error) -> Self {
        AttemptError::Failed(e.to_string())
    }
}

impl From<MrError> for AttemptError {
    fn from(e: MrError) -> Self {
        AttemptError::Failed(e.to_string())
    }
}
