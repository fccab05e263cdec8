//! Lifecycle and collaborator traits.
//!
//! [`Pipeline`] is the lifecycle every long-running stage implements
//! (discovery scheduler, job processor). [`DynPipeline`] is its
//! dyn-compatible twin so the daemon can keep heterogeneous stages in one
//! registry.
//!
//! The remaining traits are the narrow seams to external collaborators:
//! the repository platform ([`ProjectSource`]), the checkout mechanism
//! ([`CheckoutProvider`]), the SBOM tool ([`SbomGenerator`]) and the
//! relational store ([`ResultStore`]).

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use serde::Serialize;

use crate::error::{CheckoutError, GeneratorError, SbomerError, SourceError, StorageError};
use crate::types::{
    BatchStats, OperationLogEntry, ProjectDetails, ProjectPage, Scope, SbomRecord, StoredSbom,
};

/// Boxed future used by the dyn-compatible traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Health of a running stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum HealthStatus {
    /// Operating normally.
    Healthy,
    /// Running with reduced capability.
    Degraded(String),
    /// Not operating.
    Unhealthy(String),
}

impl HealthStatus {
    /// Returns `true` for [`HealthStatus::Healthy`].
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Returns `true` for [`HealthStatus::Unhealthy`].
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

/// Lifecycle of a long-running stage.
///
/// ```text
/// Initialized -> start() -> Running -> stop() -> Stopped
/// ```
pub trait Pipeline: Send + Sync {
    /// Spawns the stage's background tasks.
    fn start(&mut self) -> impl Future<Output = Result<(), SbomerError>> + Send;

    /// Signals the stage to stop and waits for in-flight work to drain.
    fn stop(&mut self) -> impl Future<Output = Result<(), SbomerError>> + Send;

    /// Reports the stage's health.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

/// dyn-compatible form of [`Pipeline`].
///
/// Every `Pipeline` implements it automatically.
pub trait DynPipeline: Send + Sync {
    fn start(&mut self) -> BoxFuture<'_, Result<(), SbomerError>>;
    fn stop(&mut self) -> BoxFuture<'_, Result<(), SbomerError>>;
    fn health_check(&self) -> BoxFuture<'_, HealthStatus>;
}

impl<T: Pipeline> DynPipeline for T {
    fn start(&mut self) -> BoxFuture<'_, Result<(), SbomerError>> {
        Box::pin(Pipeline::start(self))
    }

    fn stop(&mut self) -> BoxFuture<'_, Result<(), SbomerError>> {
        Box::pin(Pipeline::stop(self))
    }

    fn health_check(&self) -> BoxFuture<'_, HealthStatus> {
        Box::pin(Pipeline::health_check(self))
    }
}

/// Paginated project listing on the remote platform.
pub trait ProjectSource: Send + Sync {
    /// Fetches one page of projects. Pages are 1-based.
    fn list_projects(
        &self,
        scope: &Scope,
        page: u32,
        per_page: u32,
    ) -> impl Future<Output = Result<ProjectPage, SourceError>> + Send;

    /// Fetches the metadata of a single project.
    fn get_project(
        &self,
        project_id: i64,
    ) -> impl Future<Output = Result<ProjectDetails, SourceError>> + Send;
}

/// A project materialized on local disk.
#[derive(Debug, Clone)]
pub struct Checkout {
    /// Root of the working tree, `<temp_dir>/project-<id>`.
    pub path: PathBuf,
    /// Clone URL without credentials.
    pub source_url: String,
    /// Metadata fetched alongside the clone.
    pub details: ProjectDetails,
}

/// Materializes projects on disk and removes them again.
pub trait CheckoutProvider: Send + Sync {
    /// Clones the project into a fresh per-project directory.
    ///
    /// On error no directory is left behind.
    fn clone_project(
        &self,
        project_id: i64,
    ) -> impl Future<Output = Result<Checkout, CheckoutError>> + Send;

    /// Removes a checkout. Removing a missing path succeeds.
    fn cleanup(&self, path: &Path) -> impl Future<Output = Result<(), CheckoutError>> + Send;
}

/// External SBOM generation tool.
pub trait SbomGenerator: Send + Sync {
    /// Writes an SBOM document for `source` to `output`.
    fn generate(
        &self,
        source: &Path,
        output: &Path,
    ) -> impl Future<Output = Result<(), GeneratorError>> + Send;

    /// Format name embedded in downstream events, e.g. `cyclonedx-json`.
    fn format(&self) -> &str;
}

/// Persistence of SBOM records and the audit trail.
pub trait ResultStore: Send + Sync {
    /// Inserts or replaces the record keyed by `project_uid`.
    fn upsert_sbom(
        &self,
        record: &SbomRecord,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Appends one audit entry.
    fn append_log(
        &self,
        entry: &OperationLogEntry,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Appends one batch statistics row and returns its id.
    fn append_batch_stats(
        &self,
        stats: &BatchStats,
    ) -> impl Future<Output = Result<i64, StorageError>> + Send;

    /// Looks up the stored record for a project.
    fn get_sbom(
        &self,
        project_uid: i64,
    ) -> impl Future<Output = Result<Option<StoredSbom>, StorageError>> + Send;
}

impl<T: ResultStore> ResultStore for std::sync::Arc<T> {
    fn upsert_sbom(
        &self,
        record: &SbomRecord,
    ) -> impl Future<Output = Result<(), StorageError>> + Send {
        (**self).upsert_sbom(record)
    }

    fn append_log(
        &self,
        entry: &OperationLogEntry,
    ) -> impl Future<Output = Result<(), StorageError>> + Send {
        (**self).append_log(entry)
    }

    fn append_batch_stats(
        &self,
        stats: &BatchStats,
    ) -> impl Future<Output = Result<i64, StorageError>> + Send {
        (**self).append_batch_stats(stats)
    }

    fn get_sbom(
        &self,
        project_uid: i64,
    ) -> impl Future<Output = Result<Option<StoredSbom>, StorageError>> + Send {
        (**self).get_sbom(project_uid)
    }
}

impl<T: CheckoutProvider> CheckoutProvider for std::sync::Arc<T> {
    fn clone_project(
        &self,
        project_id: i64,
    ) -> impl Future<Output = Result<Checkout, CheckoutError>> + Send {
        (**self).clone_project(project_id)
    }

    fn cleanup(&self, path: &Path) -> impl Future<Output = Result<(), CheckoutError>> + Send {
        (**self).cleanup(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counting {
        starts: u32,
        running: bool,
    }

    impl Pipeline for Counting {
        async fn start(&mut self) -> Result<(), SbomerError> {
            if self.running {
                return Err(crate::error::PipelineError::AlreadyRunning.into());
            }
            self.starts += 1;
            self.running = true;
            Ok(())
        }

        async fn stop(&mut self) -> Result<(), SbomerError> {
            if !self.running {
                return Err(crate::error::PipelineError::NotRunning.into());
            }
            self.running = false;
            Ok(())
        }

        async fn health_check(&self) -> HealthStatus {
            if self.running {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy("stopped".to_owned())
            }
        }
    }

    #[tokio::test]
    async fn pipeline_is_usable_through_dyn_pipeline() {
        let mut boxed: Box<dyn DynPipeline> = Box::new(Counting {
            starts: 0,
            running: false,
        });

        boxed.start().await.unwrap();
        assert!(boxed.health_check().await.is_healthy());
        assert!(boxed.start().await.is_err());

        boxed.stop().await.unwrap();
        assert_eq!(
            boxed.health_check().await,
            HealthStatus::Unhealthy("stopped".to_owned())
        );
    }
}
