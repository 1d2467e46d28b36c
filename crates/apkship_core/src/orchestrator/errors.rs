//! Error types for the release pipeline.
//!
//! Errors carry context that chains through layers:
//! Run → Stage → Operation → Detail

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Top-level pipeline error with run context.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A stage failed; nothing after it ran.
    #[error("Pipeline failed at stage '{stage}': {source}")]
    StageFailed {
        stage: String,
        /// Version known when the stage failed, if any.
        version: Option<String>,
        /// Stages that completed before the failure.
        completed: Vec<String>,
        #[source]
        source: StageError,
    },

    /// The pipeline definition itself is unusable.
    #[error("Pipeline validation failed: {0}")]
    ValidationFailed(String),

    /// Cancellation was requested; checked between stages.
    #[error("Pipeline cancelled before stage '{before_stage}'")]
    Cancelled {
        before_stage: String,
        completed: Vec<String>,
    },
}

impl PipelineError {
    /// Create a stage failed error.
    pub fn stage_failed(
        stage: impl Into<String>,
        version: Option<String>,
        completed: Vec<String>,
        source: StageError,
    ) -> Self {
        Self::StageFailed {
            stage: stage.into(),
            version,
            completed,
            source,
        }
    }

    /// Create a validation failed error.
    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::ValidationFailed(message.into())
    }

    /// Create a cancelled error.
    pub fn cancelled(before_stage: impl Into<String>, completed: Vec<String>) -> Self {
        Self::Cancelled {
            before_stage: before_stage.into(),
            completed,
        }
    }

    /// Name of the stage that failed, if a stage failed.
    pub fn failed_stage(&self) -> Option<&str> {
        match self {
            Self::StageFailed { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// Underlying stage error, if a stage failed.
    pub fn stage_error(&self) -> Option<&StageError> {
        match self {
            Self::StageFailed { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Stages that completed before the run stopped.
    pub fn completed_stages(&self) -> &[String] {
        match self {
            Self::StageFailed { completed, .. } | Self::Cancelled { completed, .. } => completed,
            Self::ValidationFailed(_) => &[],
        }
    }
}

/// Why a stage failed, as seen by callers that need to branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The stage received an incomplete or malformed context.
    Precondition,
    /// An external process, network call or file operation failed.
    Io,
    /// The stage ran but its output failed a post-condition.
    Verification,
    /// The stage exceeded its time limit.
    Timeout,
}

/// Error from a pipeline stage or the adapter behind it.
#[derive(Error, Debug)]
pub enum StageError {
    /// Input validation failed.
    #[error("Input validation failed: {0}")]
    InvalidInput(String),

    /// Output validation failed.
    #[error("Output validation failed: {0}")]
    InvalidOutput(String),

    /// A required context field was missing.
    #[error("Precondition not met: {0}")]
    PreconditionFailed(String),

    /// An external command failed.
    #[error("{tool} failed with exit code {exit_code}: {message}")]
    CommandFailed {
        tool: String,
        exit_code: i32,
        message: String,
    },

    /// File I/O error.
    #[error("I/O error in {operation}: {source}")]
    IoError {
        operation: String,
        #[source]
        source: io::Error,
    },

    /// A required file was not found.
    #[error("Required file not found: {path}")]
    FileNotFound { path: String },

    /// Parsing error (HTML scraping, API responses).
    #[error("Failed to parse {what}: {message}")]
    ParseError { what: String, message: String },

    /// A network request failed or returned an error status.
    #[error("HTTP error while {operation}: {message}")]
    Http { operation: String, message: String },

    /// A post-condition check (e.g. signature verification) did not pass.
    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    /// The stage did not finish within its limit.
    #[error("Stage timeout after {}s", .limit.as_secs_f64())]
    Timeout { limit: Duration },

    /// Generic stage error with message.
    #[error("{0}")]
    Other(String),
}

impl StageError {
    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create an invalid output error.
    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::InvalidOutput(message.into())
    }

    /// Create a precondition failed error.
    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::PreconditionFailed(message.into())
    }

    /// Create a command failed error.
    pub fn command_failed(
        tool: impl Into<String>,
        exit_code: i32,
        message: impl Into<String>,
    ) -> Self {
        Self::CommandFailed {
            tool: tool.into(),
            exit_code,
            message: message.into(),
        }
    }

    /// Create an I/O error with context.
    pub fn io_error(operation: impl Into<String>, source: io::Error) -> Self {
        Self::IoError {
            operation: operation.into(),
            source,
        }
    }

    /// Create a file not found error.
    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Create a parse error.
    pub fn parse_error(what: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseError {
            what: what.into(),
            message: message.into(),
        }
    }

    /// Create an HTTP error.
    pub fn http(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Http {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a verification failed error.
    pub fn verification_failed(message: impl Into<String>) -> Self {
        Self::VerificationFailed(message.into())
    }

    /// Create a timeout error.
    pub fn timeout(limit: Duration) -> Self {
        Self::Timeout { limit }
    }

    /// Create a generic error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) | Self::PreconditionFailed(_) => ErrorKind::Precondition,
            Self::InvalidOutput(_) | Self::VerificationFailed(_) => ErrorKind::Verification,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::CommandFailed { .. }
            | Self::IoError { .. }
            | Self::FileNotFound { .. }
            | Self::ParseError { .. }
            | Self::Http { .. }
            | Self::Other(_) => ErrorKind::Io,
        }
    }
}

impl From<reqwest::Error> for StageError {
    fn from(err: reqwest::Error) -> Self {
        let operation = match err.url() {
            Some(url) => format!("requesting {}", url),
            None => "sending request".to_string(),
        };
        Self::http(operation, err.to_string())
    }
}

/// Result type for stage operations.
pub type StageResult<T> = Result<T, StageError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
