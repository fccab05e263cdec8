//! Per-item state machine.
//!
//! ```text
//! received -> cloning -> cloned -> generating_sbom -> sbom_generated
//!          -> persisting -> persisted -> publishing_downstream -> done
//! ```
//!
//! Any phase may end in `failed(phase)`. The checkout directory is removed
//! on every exit path once the clone succeeded, including when the
//! processing future itself is dropped.

use std::fmt;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::Utc;
use metrics::counter;
use sbomer_core::config::BindingConfig;
use sbomer_core::metrics as m;
use sbomer_core::pipeline::{Checkout, CheckoutProvider, ResultStore, SbomGenerator};
use sbomer_core::types::{
    EmbeddedSbom, Operation, OperationLogEntry, OperationStatus, ScanMetadata, ScanRequestEvent,
    SbomRecord, WorkItem,
};
use sbomer_queue::Publisher;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::ProcessorError;

/// File the generator writes inside the checkout.
pub const SBOM_FILE_NAME: &str = "sbom.json";

const EVENT_SOURCE: &str = "sbomer";
const EVENT_VERSION: &str = "1.0";

/// Processing phase of one work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Received,
    Cloning,
    Cloned,
    GeneratingSbom,
    SbomGenerated,
    Persisting,
    Persisted,
    PublishingDownstream,
    Done,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Cloning => "cloning",
            Self::Cloned => "cloned",
            Self::GeneratingSbom => "generating_sbom",
            Self::SbomGenerated => "sbom_generated",
            Self::Persisting => "persisting",
            Self::Persisted => "persisted",
            Self::PublishingDownstream => "publishing_downstream",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where scan request events go.
#[derive(Debug, Clone)]
pub struct DownstreamTarget {
    pub exchange: String,
    pub routing_key: String,
}

impl From<&BindingConfig> for DownstreamTarget {
    fn from(binding: &BindingConfig) -> Self {
        Self {
            exchange: binding.exchange.clone(),
            routing_key: binding.routing_key.clone(),
        }
    }
}

/// Removes a checkout when processing leaves its scope.
///
/// [`CheckoutGuard::release`] runs the provider's async cleanup. If the
/// guard is dropped without it (the processing future was dropped
/// mid-phase) the directory is removed synchronously.
struct CheckoutGuard<'a, C: CheckoutProvider> {
    provider: &'a C,
    path: Option<PathBuf>,
}

impl<'a, C: CheckoutProvider> CheckoutGuard<'a, C> {
    fn new(provider: &'a C, path: &Path) -> Self {
        Self {
            provider,
            path: Some(path.to_path_buf()),
        }
    }

    async fn release(mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = self.provider.cleanup(&path).await {
                warn!(path = %path.display(), error = %e, "checkout cleanup failed");
            }
        }
    }
}

impl<C: CheckoutProvider> Drop for CheckoutGuard<'_, C> {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            match std::fs::remove_dir_all(&path) {
                Ok(()) => debug!(path = %path.display(), "checkout removed on drop"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "checkout cleanup on drop failed"),
            }
        }
    }
}

/// Takes one work item from delivery to a terminal state.
pub struct JobProcessor<C, G, R, P> {
    checkout: C,
    generator: G,
    store: R,
    publisher: P,
    downstream: DownstreamTarget,
}

impl<C, G, R, P> JobProcessor<C, G, R, P>
where
    C: CheckoutProvider,
    G: SbomGenerator,
    R: ResultStore,
    P: Publisher,
{
    pub fn new(checkout: C, generator: G, store: R, publisher: P, downstream: DownstreamTarget) -> Self {
        Self {
            checkout,
            generator,
            store,
            publisher,
            downstream,
        }
    }

    /// Processes one message body.
    ///
    /// Returns the work item on success. Shutdown is honoured between
    /// phases; a phase that has started runs to completion.
    pub async fn process(
        &self,
        body: &[u8],
        cancel: &CancellationToken,
    ) -> Result<WorkItem, ProcessorError> {
        let item = match WorkItem::from_bytes(body) {
            Ok(item) => item,
            Err(e) => {
                warn!(error = %e, len = body.len(), "dropping malformed work item");
                return Err(e.into());
            }
        };
        let project_id = item.project_id;
        enter(project_id, Phase::Received);

        if cancel.is_cancelled() {
            return Err(ProcessorError::Cancelled);
        }

        enter(project_id, Phase::Cloning);
        self.audit(OperationLogEntry::new(project_id, Operation::Clone, OperationStatus::Started))
            .await;

        let checkout = match self.checkout.clone_project(project_id).await {
            Ok(checkout) => checkout,
            Err(e) => {
                self.audit(OperationLogEntry::failed(project_id, Operation::Clone, &e))
                    .await;
                warn!(project_id, phase = %Phase::Cloning, error = %e, "work item failed");
                return Err(e.into());
            }
        };

        let guard = CheckoutGuard::new(&self.checkout, &checkout.path);
        enter(project_id, Phase::Cloned);
        self.audit(OperationLogEntry::new(project_id, Operation::Clone, OperationStatus::Success))
            .await;

        let result = self.process_checkout(&item, &checkout, cancel).await;
        guard.release().await;

        match &result {
            Ok(()) => {
                enter(project_id, Phase::Done);
                info!(project_id, name = %checkout.details.name, "work item completed");
            }
            Err(e) => warn!(project_id, error = %e, "work item failed"),
        }
        result.map(|()| item)
    }

    /// Everything after a successful clone. The caller owns cleanup.
    async fn process_checkout(
        &self,
        item: &WorkItem,
        checkout: &Checkout,
        cancel: &CancellationToken,
    ) -> Result<(), ProcessorError> {
        let project_id = item.project_id;

        if cancel.is_cancelled() {
            return Err(ProcessorError::Cancelled);
        }
        enter(project_id, Phase::GeneratingSbom);

        let output = checkout.path.join(SBOM_FILE_NAME);
        if let Err(e) = self.generator.generate(&checkout.path, &output).await {
            self.audit(OperationLogEntry::failed(project_id, Operation::Sbom, &e))
                .await;
            return Err(e.into());
        }

        let document = match tokio::fs::read(&output).await {
            Ok(document) => document,
            Err(source) => {
                let err = ProcessorError::ReadSbom {
                    path: output.display().to_string(),
                    source,
                };
                self.audit(OperationLogEntry::failed(project_id, Operation::Sbom, &err))
                    .await;
                return Err(err);
            }
        };
        enter(project_id, Phase::SbomGenerated);

        if cancel.is_cancelled() {
            return Err(ProcessorError::Cancelled);
        }
        enter(project_id, Phase::Persisting);

        let record = SbomRecord::from_details(&checkout.details, document);
        if let Err(e) = self.store.upsert_sbom(&record).await {
            self.audit(OperationLogEntry::failed(project_id, Operation::Sbom, &e))
                .await;
            return Err(e.into());
        }
        enter(project_id, Phase::Persisted);
        self.audit(OperationLogEntry::new(project_id, Operation::Sbom, OperationStatus::Success))
            .await;

        enter(project_id, Phase::PublishingDownstream);
        let event = self.scan_request(item, checkout, &record.sbom_document);
        if let Err(e) = self.publish(&event).await {
            counter!(m::PROCESSOR_SCAN_REQUESTS_LOST_TOTAL).increment(1);
            error!(
                project_id,
                job_id = %event.metadata.job_id,
                error = %e,
                "scan request lost: sbom is stored but the downstream event was not published"
            );
            return Err(e);
        }

        Ok(())
    }

    fn scan_request(&self, item: &WorkItem, checkout: &Checkout, document: &[u8]) -> ScanRequestEvent {
        let details = &checkout.details;
        let project_url = checkout
            .source_url
            .strip_suffix(".git")
            .unwrap_or(&checkout.source_url);

        ScanRequestEvent {
            metadata: ScanMetadata {
                project_id: item.project_id.to_string(),
                project_title: details.name.clone(),
                project_url: project_url.to_owned(),
                job_id: Uuid::new_v4().to_string(),
                commit_branch: details.default_branch.clone(),
                source: EVENT_SOURCE.to_owned(),
                generated_date: Utc::now().format("%Y-%m-%d").to_string(),
                sbom_format: self.generator.format().to_owned(),
                version: EVENT_VERSION.to_owned(),
                topics_id: details.topics.clone(),
            },
            sbom: EmbeddedSbom::from_document(document),
        }
    }

    async fn publish(&self, event: &ScanRequestEvent) -> Result<(), ProcessorError> {
        let body = serde_json::to_vec(event).map_err(|e| ProcessorError::Encode(e.to_string()))?;
        self.publisher
            .publish(
                &self.downstream.exchange,
                &self.downstream.routing_key,
                Bytes::from(body),
            )
            .await
            .map_err(ProcessorError::Publish)
    }

    /// Audit entries are best effort.
    async fn audit(&self, entry: OperationLogEntry) {
        if let Err(e) = self.store.append_log(&entry).await {
            warn!(
                project_id = entry.project_id,
                operation = %entry.operation,
                status = %entry.status,
                error = %e,
                "failed to append operation log"
            );
        }
    }
}

fn enter(project_id: i64, phase: Phase) {
    debug!(project_id, phase = %phase, "phase transition");
}
