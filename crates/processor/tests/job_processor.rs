//! JobProcessor phases against in-memory collaborators.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use sbomer_core::pipeline::ResultStore;
use sbomer_core::types::{
    EmbeddedSbom, Operation, OperationStatus, ScanRequestEvent, StoredSbom, WorkItem,
};
use sbomer_processor::{Disposition, JobProcessor, ProcessorError};
use sbomer_queue::{Consumer, MemoryBroker};
use sbomer_store::MemoryResultStore;
use tokio_util::sync::CancellationToken;

struct Harness {
    _root: tempfile::TempDir,
    checkout: Arc<FakeCheckout>,
    store: Arc<MemoryResultStore>,
    broker: MemoryBroker,
}

impl Harness {
    fn new() -> Self {
        Self::with_checkout(|root| FakeCheckout::new(root))
    }

    fn with_checkout(make: impl FnOnce(&std::path::Path) -> FakeCheckout) -> Self {
        let root = tempfile::tempdir().unwrap();
        let checkout = Arc::new(make(root.path()));
        Self {
            _root: root,
            checkout,
            store: Arc::new(MemoryResultStore::new()),
            broker: broker(),
        }
    }

    fn processor(
        &self,
        generator: FakeGenerator,
    ) -> TestProcessor<FakeGenerator, Arc<MemoryResultStore>> {
        JobProcessor::new(
            Arc::clone(&self.checkout),
            generator,
            Arc::clone(&self.store),
            self.broker.clone(),
            downstream(),
        )
    }

    fn audit_trail(&self, project_id: i64) -> Vec<(Operation, OperationStatus)> {
        self.store
            .logs_for(project_id)
            .into_iter()
            .map(|e| (e.operation, e.status))
            .collect()
    }

    async fn stored(&self, project_uid: i64) -> StoredSbom {
        self.store
            .get_sbom(project_uid)
            .await
            .unwrap()
            .expect("record stored")
    }

    async fn next_scan_request(&self) -> ScanRequestEvent {
        let mut subscription = self.broker.subscribe(DOWNSTREAM_GROUP, 1).await.unwrap();
        let delivery = tokio::time::timeout(Duration::from_secs(2), subscription.next())
            .await
            .expect("no scan request published")
            .unwrap();
        let event = serde_json::from_slice(delivery.body()).unwrap();
        delivery.ack().await.unwrap();
        event
    }
}

fn body(project_id: i64) -> Vec<u8> {
    WorkItem::new(project_id).unwrap().to_bytes()
}

#[tokio::test]
async fn successful_item_is_stored_published_and_cleaned_up() {
    let harness = Harness::new();
    let processor = harness.processor(FakeGenerator::writing(DOCUMENT));

    let item = processor
        .process(&body(42), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(item.project_id, 42);

    let stored = harness.stored(42).await;
    assert_eq!(stored.record.name, "foo");
    assert_eq!(stored.record.path, "acme/foo");
    assert_eq!(stored.record.topics, vec!["x".to_owned()]);
    assert_eq!(stored.record.sbom_document, DOCUMENT);
    assert_eq!(harness.store.upsert_count(), 1);

    assert_eq!(
        harness.audit_trail(42),
        vec![
            (Operation::Clone, OperationStatus::Started),
            (Operation::Clone, OperationStatus::Success),
            (Operation::Sbom, OperationStatus::Success),
        ]
    );

    let event = harness.next_scan_request().await;
    assert_eq!(event.metadata.project_id, "42");
    assert_eq!(event.metadata.project_title, "foo");
    assert_eq!(event.metadata.project_url, "https://gitlab.example.com/acme/foo");
    assert_eq!(event.metadata.commit_branch, "main");
    assert_eq!(event.metadata.source, "sbomer");
    assert_eq!(event.metadata.version, "1.0");
    assert_eq!(event.metadata.sbom_format, "cyclonedx-json");
    assert_eq!(event.metadata.topics_id, vec!["x".to_owned()]);
    assert_eq!(event.metadata.generated_date.len(), 10);
    assert!(uuid::Uuid::parse_str(&event.metadata.job_id).is_ok());
    assert!(matches!(event.sbom, EmbeddedSbom::Json(ref v) if v["bomFormat"] == "CycloneDX"));

    assert!(!harness.checkout.project_dir(42).exists());
    assert_eq!(harness.checkout.cleanup_count(), 1);
}

#[tokio::test]
async fn clone_failure_is_audited_and_acknowledged() {
    let harness = Harness::with_checkout(FakeCheckout::failing);
    let processor = harness.processor(FakeGenerator::writing(DOCUMENT));

    let err = processor
        .process(&body(7), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessorError::Checkout(_)));
    assert_eq!(err.disposition(), Disposition::Ack);

    let logs = harness.store.logs_for(7);
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[1].operation, Operation::Clone);
    assert_eq!(logs[1].status, OperationStatus::Failed);
    assert!(logs[1].error_message.as_deref().unwrap().contains("repository not found"));

    assert_eq!(harness.store.sbom_count(), 0);
    assert_eq!(harness.broker.ready_count(DOWNSTREAM_GROUP), 0);
    assert!(!harness.checkout.project_dir(7).exists());
    assert_eq!(harness.checkout.cleanup_count(), 0);
}

#[tokio::test]
async fn generator_failure_still_removes_checkout() {
    let harness = Harness::new();
    let processor = harness.processor(FakeGenerator::with_mode(GeneratorMode::Fails));

    let err = processor
        .process(&body(9), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessorError::Generator(_)));
    assert_eq!(err.disposition(), Disposition::Ack);

    assert_eq!(
        harness.audit_trail(9),
        vec![
            (Operation::Clone, OperationStatus::Started),
            (Operation::Clone, OperationStatus::Success),
            (Operation::Sbom, OperationStatus::Failed),
        ]
    );
    assert_eq!(harness.store.sbom_count(), 0);
    assert_eq!(harness.broker.ready_count(DOWNSTREAM_GROUP), 0);
    assert!(!harness.checkout.project_dir(9).exists());
}

#[tokio::test]
async fn missing_output_file_is_a_generation_failure() {
    let harness = Harness::new();
    let processor = harness.processor(FakeGenerator::with_mode(GeneratorMode::WritesNothing));

    let err = processor
        .process(&body(10), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessorError::ReadSbom { .. }));
    assert_eq!(err.disposition(), Disposition::Ack);
    assert_eq!(
        harness.audit_trail(10).last(),
        Some(&(Operation::Sbom, OperationStatus::Failed))
    );
    assert!(!harness.checkout.project_dir(10).exists());
}

#[tokio::test]
async fn storage_failure_requeues_and_cleans_up() {
    let root = tempfile::tempdir().unwrap();
    let checkout = Arc::new(FakeCheckout::new(root.path()));
    let store = Arc::new(BrokenUpsertStore::default());
    let broker = broker();
    let processor = JobProcessor::new(
        Arc::clone(&checkout),
        FakeGenerator::writing(DOCUMENT),
        Arc::clone(&store),
        broker.clone(),
        downstream(),
    );

    let err = processor
        .process(&body(11), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessorError::Storage(_)));
    assert_eq!(err.disposition(), Disposition::Requeue);

    let statuses: Vec<_> = store.inner.logs_for(11).into_iter().map(|e| e.status).collect();
    assert_eq!(statuses.last(), Some(&OperationStatus::Failed));
    assert_eq!(broker.ready_count(DOWNSTREAM_GROUP), 0);
    assert!(!checkout.project_dir(11).exists());
}

#[tokio::test]
async fn redelivered_item_overwrites_the_same_record() {
    let harness = Harness::new();
    let processor = harness.processor(FakeGenerator::writing(DOCUMENT));
    let cancel = CancellationToken::new();

    processor.process(&body(42), &cancel).await.unwrap();
    processor.process(&body(42), &cancel).await.unwrap();

    assert_eq!(harness.store.sbom_count(), 1);
    assert_eq!(harness.store.upsert_count(), 2);
    assert_eq!(harness.stored(42).await.record.sbom_document, DOCUMENT);
    assert_eq!(harness.broker.ready_count(DOWNSTREAM_GROUP), 2);
    assert_eq!(harness.store.logs_for(42).len(), 6);
}

#[tokio::test]
async fn malformed_body_is_dropped_without_side_effects() {
    let harness = Harness::new();
    let processor = harness.processor(FakeGenerator::writing(DOCUMENT));

    for raw in [&b"not json"[..], br#"{"project_id": 0}"#, br#"{"id": 5}"#] {
        let err = processor
            .process(raw, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::Malformed(_)), "{err}");
        assert_eq!(err.disposition(), Disposition::Ack);
        assert_eq!(err.result_label(), "malformed");
    }

    assert_eq!(harness.checkout.cleanup_count(), 0);
    assert_eq!(harness.store.sbom_count(), 0);
}

#[tokio::test]
async fn cancelled_before_clone_is_requeued_untouched() {
    let harness = Harness::new();
    let processor = harness.processor(FakeGenerator::writing(DOCUMENT));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = processor.process(&body(3), &cancel).await.unwrap_err();
    assert!(matches!(err, ProcessorError::Cancelled));
    assert_eq!(err.disposition(), Disposition::Requeue);
    assert!(harness.store.logs_for(3).is_empty());
    assert!(!harness.checkout.project_dir(3).exists());
}

#[tokio::test]
async fn unroutable_scan_request_keeps_the_stored_sbom() {
    let harness = Harness::new();
    let processor = JobProcessor::new(
        Arc::clone(&harness.checkout),
        FakeGenerator::writing(DOCUMENT),
        Arc::clone(&harness.store),
        MemoryBroker::new(),
        downstream(),
    );

    let err = processor
        .process(&body(5), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessorError::Publish(_)));
    assert_eq!(err.disposition(), Disposition::Ack);
    assert_eq!(harness.store.sbom_count(), 1);
    assert!(!harness.checkout.project_dir(5).exists());
}

#[tokio::test]
async fn non_json_document_is_embedded_as_text() {
    let harness = Harness::new();
    let processor = harness.processor(FakeGenerator::writing(b"SPDXVersion: SPDX-2.3\n"));

    processor
        .process(&body(8), &CancellationToken::new())
        .await
        .unwrap();

    let event = harness.next_scan_request().await;
    assert_eq!(event.sbom, EmbeddedSbom::Raw("SPDXVersion: SPDX-2.3\n".to_owned()));
}

#[tokio::test]
async fn dropped_processing_future_removes_checkout() {
    let harness = Harness::new();
    let processor = harness.processor(FakeGenerator::with_mode(GeneratorMode::Slow(
        Duration::from_secs(30),
    )));

    let result = tokio::time::timeout(
        Duration::from_millis(100),
        processor.process(&body(12), &CancellationToken::new()),
    )
    .await;
    assert!(result.is_err(), "slow generator should not finish");
    assert!(!harness.checkout.project_dir(12).exists());
    assert_eq!(harness.store.sbom_count(), 0);
}
