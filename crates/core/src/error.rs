//! Error types shared across the pipeline.
//!
//! [`SbomerError`] is the top-level error the daemon and CLI deal with. Each
//! crate keeps its own domain error and converts into it, so `?` carries
//! failures up to the binaries without losing the category.

/// Top-level sbomer error.
#[derive(Debug, thiserror::Error)]
pub enum SbomerError {
    /// Configuration loading or validation failed.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Lifecycle or wiring failure of a pipeline stage.
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// A message body could not be decoded.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// The remote repository platform rejected or failed a request.
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// Materializing a project on disk failed.
    #[error("checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// The external SBOM tool failed.
    #[error("generator error: {0}")]
    Generator(#[from] GeneratorError),

    /// The result store failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The work queue failed.
    #[error("queue error: {0}")]
    Queue(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// The configuration file is not valid TOML or does not match the schema.
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// A field holds a value outside its accepted range.
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Lifecycle errors of a [`Pipeline`](crate::pipeline::Pipeline) stage.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// `start()` was called on a running stage.
    #[error("pipeline already running")]
    AlreadyRunning,

    /// `stop()` was called on a stage that is not running.
    #[error("pipeline not running")]
    NotRunning,

    /// The stage could not be assembled or started.
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// The operation was interrupted by the shutdown signal.
    #[error("cancelled by shutdown signal")]
    Cancelled,
}

/// Message decoding errors.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The payload is not the expected JSON shape.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// The payload carries a project id that is zero or negative.
    #[error("invalid project id: {0}")]
    InvalidProjectId(i64),
}

/// Remote platform errors.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The request never produced a response.
    #[error("request failed: {0}")]
    Request(String),

    /// The platform answered with a non-success status.
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    /// The response body could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Checkout errors.
#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    /// Project metadata lookup failed.
    #[error("project {project_id} lookup failed: {reason}")]
    Lookup { project_id: i64, reason: String },

    /// Preparing the local workspace failed.
    #[error("workspace error at {path}: {reason}")]
    Workspace { path: String, reason: String },

    /// The clone command failed.
    #[error("clone of {url} failed: {reason}")]
    Clone { url: String, reason: String },
}

/// SBOM generator errors.
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    /// The generator binary could not be located.
    #[error("generator binary not found: {0}")]
    BinaryNotFound(String),

    /// The generator could not be spawned.
    #[error("failed to spawn generator: {0}")]
    Spawn(String),

    /// The generator ran and exited unsuccessfully.
    #[error("generator exited with {status}, output: {output}")]
    Failed { status: String, output: String },
}

/// Result store errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The store could not be reached.
    #[error("connection failed: {0}")]
    Connection(String),

    /// A statement failed.
    #[error("query failed: {0}")]
    Query(String),

    /// Schema migration failed.
    #[error("migration failed: {0}")]
    Migration(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_to_top_level() {
        let err: SbomerError = ConfigError::InvalidValue {
            field: "fetcher.batch_size".to_owned(),
            reason: "must be 1-100".to_owned(),
        }
        .into();
        assert!(matches!(err, SbomerError::Config(_)));
        assert!(err.to_string().contains("fetcher.batch_size"));
    }

    #[test]
    fn generator_error_carries_tool_output() {
        let err = GeneratorError::Failed {
            status: "exit status: 1".to_owned(),
            output: "could not determine source".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("exit status: 1"));
        assert!(msg.contains("could not determine source"));
    }

    #[test]
    fn checkout_error_display_has_project_id() {
        let err = CheckoutError::Lookup {
            project_id: 42,
            reason: "404 Not Found".to_owned(),
        };
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn source_status_error_display() {
        let err = SourceError::Status {
            status: 503,
            url: "https://gitlab.example.com/api/v4/projects".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("/api/v4/projects"));
    }

    #[test]
    fn parse_error_converts_to_top_level() {
        let err: SbomerError = ParseError::InvalidProjectId(-3).into();
        assert!(matches!(err, SbomerError::Parse(ParseError::InvalidProjectId(-3))));
    }
}
