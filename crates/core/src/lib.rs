//! Shared building blocks of the sbomer job pipeline: domain types,
//! configuration, the error taxonomy, metric names and the traits that
//! separate the pipeline from its external collaborators.

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod types;

// errors
pub use error::{
    CheckoutError, ConfigError, GeneratorError, ParseError, PipelineError, SbomerError,
    SourceError, StorageError,
};

// config
pub use config::SbomerConfig;

// traits
pub use pipeline::{
    BoxFuture, Checkout, CheckoutProvider, DynPipeline, HealthStatus, Pipeline, ProjectSource,
    ResultStore, SbomGenerator,
};

// domain types
pub use types::{
    BatchStats, EmbeddedSbom, Operation, OperationLogEntry, OperationStatus, ProjectDetails,
    ProjectPage, ProjectSummary, ScanMetadata, ScanRequestEvent, SbomRecord, Scope, StoredSbom,
    WorkItem,
};
