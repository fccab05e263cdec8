//! Test doubles for the processor's collaborators.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use sbomer_core::config::BindingConfig;
use sbomer_core::error::{CheckoutError, GeneratorError, StorageError};
use sbomer_core::pipeline::{Checkout, CheckoutProvider, ResultStore, SbomGenerator};
use sbomer_core::types::{
    BatchStats, OperationLogEntry, ProjectDetails, SbomRecord, StoredSbom,
};
use sbomer_processor::{DownstreamTarget, JobProcessor};
use sbomer_queue::{Binding, MemoryBroker};
use sbomer_store::MemoryResultStore;

pub const DISCOVERY_GROUP: &str = "sbomer-group";
pub const DOWNSTREAM_GROUP: &str = "sbom-scan-requests";
pub const DOCUMENT: &[u8] = br#"{"bomFormat":"CycloneDX","specVersion":"1.5","components":[]}"#;

pub fn discovery_binding() -> BindingConfig {
    BindingConfig::default()
}

pub fn downstream_binding() -> BindingConfig {
    BindingConfig {
        exchange: "sbom-scan-requests".to_owned(),
        consumer_group: DOWNSTREAM_GROUP.to_owned(),
        ..BindingConfig::default()
    }
}

/// Broker with both stages declared.
pub fn broker() -> MemoryBroker {
    let broker = MemoryBroker::new();
    for config in [discovery_binding(), downstream_binding()] {
        broker.declare(&Binding::try_from(&config).unwrap()).unwrap();
    }
    broker
}

pub fn downstream() -> DownstreamTarget {
    DownstreamTarget::from(&downstream_binding())
}

pub fn details(project_id: i64) -> ProjectDetails {
    ProjectDetails {
        id: project_id,
        name: "foo".to_owned(),
        path: "acme/foo".to_owned(),
        topics: vec!["x".to_owned()],
        default_branch: "main".to_owned(),
        clone_url: "https://gitlab.example.com/acme/foo.git".to_owned(),
    }
}

/// Creates `<root>/project-<id>` like a real clone would.
pub struct FakeCheckout {
    root: PathBuf,
    fail: bool,
    cleanups: Mutex<Vec<PathBuf>>,
}

impl FakeCheckout {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            fail: false,
            cleanups: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(root: &Path) -> Self {
        Self {
            fail: true,
            ..Self::new(root)
        }
    }

    pub fn project_dir(&self, project_id: i64) -> PathBuf {
        self.root.join(format!("project-{project_id}"))
    }

    pub fn cleanup_count(&self) -> usize {
        self.cleanups.lock().unwrap().len()
    }
}

impl CheckoutProvider for FakeCheckout {
    async fn clone_project(&self, project_id: i64) -> Result<Checkout, CheckoutError> {
        let details = details(project_id);
        if self.fail {
            return Err(CheckoutError::Clone {
                url: details.clone_url,
                reason: "repository not found".to_owned(),
            });
        }

        let path = self.project_dir(project_id);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("go.mod"), b"module example.com/foo\n").unwrap();
        Ok(Checkout {
            path,
            source_url: details.clone_url.clone(),
            details,
        })
    }

    async fn cleanup(&self, path: &Path) -> Result<(), CheckoutError> {
        self.cleanups.lock().unwrap().push(path.to_path_buf());
        match std::fs::remove_dir_all(path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(CheckoutError::Workspace {
                path: path.display().to_string(),
                reason: e.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

pub enum GeneratorMode {
    Writes(Vec<u8>),
    Fails,
    WritesNothing,
    /// Writes the document after a delay.
    Slow(Duration),
}

pub struct FakeGenerator {
    mode: GeneratorMode,
}

impl FakeGenerator {
    pub fn writing(document: &[u8]) -> Self {
        Self {
            mode: GeneratorMode::Writes(document.to_vec()),
        }
    }

    pub fn with_mode(mode: GeneratorMode) -> Self {
        Self { mode }
    }
}

impl SbomGenerator for FakeGenerator {
    async fn generate(&self, source: &Path, output: &Path) -> Result<(), GeneratorError> {
        assert!(source.is_dir(), "generator called without a checkout");
        match &self.mode {
            GeneratorMode::Writes(document) => {
                std::fs::write(output, document).unwrap();
                Ok(())
            }
            GeneratorMode::Fails => Err(GeneratorError::Failed {
                status: "exit status: 1".to_owned(),
                output: "could not determine source".to_owned(),
            }),
            GeneratorMode::WritesNothing => Ok(()),
            GeneratorMode::Slow(delay) => {
                tokio::time::sleep(*delay).await;
                std::fs::write(output, DOCUMENT).unwrap();
                Ok(())
            }
        }
    }

    fn format(&self) -> &str {
        "cyclonedx-json"
    }
}

/// Memory store whose `upsert_sbom` always fails.
#[derive(Default)]
pub struct BrokenUpsertStore {
    pub inner: MemoryResultStore,
}

impl ResultStore for BrokenUpsertStore {
    async fn upsert_sbom(&self, _record: &SbomRecord) -> Result<(), StorageError> {
        Err(StorageError::Connection("connection refused".to_owned()))
    }

    async fn append_log(&self, entry: &OperationLogEntry) -> Result<(), StorageError> {
        self.inner.append_log(entry).await
    }

    async fn append_batch_stats(&self, stats: &BatchStats) -> Result<i64, StorageError> {
        self.inner.append_batch_stats(stats).await
    }

    async fn get_sbom(&self, project_uid: i64) -> Result<Option<StoredSbom>, StorageError> {
        self.inner.get_sbom(project_uid).await
    }
}

pub type TestProcessor<G, R> = JobProcessor<std::sync::Arc<FakeCheckout>, G, R, MemoryBroker>;

/// Polls `condition` every 10ms for up to 5s.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5s"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
