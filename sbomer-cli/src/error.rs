//! CLI-specific error types and exit code mapping

use sbomer_core::error::{SbomerError, StorageError};
use sbomer_queue::QueueError;
use sbomer_store::StoreError;

/// CLI-specific error type.
///
/// `exit_code()` maps each variant to a process exit code.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// The database could not be reached or a statement failed.
    #[error("database error: {0}")]
    Database(String),

    /// Publishing or declaring on the work queue failed.
    #[error("queue error: {0}")]
    Queue(String),

    /// The requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from sbomer-core.
    #[error("{0}")]
    Core(#[from] SbomerError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                      |
    /// |------|------------------------------|
    /// | 0    | Success                      |
    /// | 1    | General / command error      |
    /// | 2    | Configuration error          |
    /// | 3    | Database unreachable/failed  |
    /// | 4    | Record not found             |
    /// | 10   | IO error                     |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Database(_) => 3,
            Self::NotFound(_) => 4,
            Self::Io(_) => 10,
            Self::Command(_) | Self::Queue(_) | Self::JsonSerialize(_) | Self::Core(_) => 1,
        }
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<StorageError> for CliError {
    fn from(e: StorageError) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<QueueError> for CliError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::Connection(reason) => Self::Database(reason),
            other => Self::Queue(other.to_string()),
        }
    }
}
