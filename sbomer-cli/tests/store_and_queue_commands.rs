//! `enqueue` and `sbom show` against the in-memory backends.

use sbomer_cli::cli::OutputFormat;
use sbomer_cli::commands::enqueue::enqueue_items;
use sbomer_cli::commands::sbom::{Document, lookup};
use sbomer_cli::error::CliError;
use sbomer_cli::output::OutputWriter;
use sbomer_core::config::BindingConfig;
use sbomer_core::pipeline::ResultStore;
use sbomer_core::types::{SbomRecord, WorkItem};
use sbomer_queue::{Binding, Consumer, MemoryBroker};
use sbomer_store::MemoryResultStore;

fn discovery() -> BindingConfig {
    BindingConfig::default()
}

fn broker() -> MemoryBroker {
    let broker = MemoryBroker::new();
    broker
        .declare(&Binding::try_from(&discovery()).unwrap())
        .unwrap();
    broker
}

fn record(project_uid: i64, document: &[u8]) -> SbomRecord {
    SbomRecord {
        project_uid,
        name: "foo".to_owned(),
        path: "acme/foo".to_owned(),
        topics: vec!["go".to_owned(), "backend".to_owned()],
        sbom_document: document.to_vec(),
    }
}

#[tokio::test]
async fn enqueue_publishes_count_items() {
    let broker = broker();
    let binding = discovery();

    let report = enqueue_items(&broker, &binding, 42, 3).await.unwrap();
    assert_eq!(report.published, 3);
    assert_eq!(report.exchange, binding.exchange);
    assert_eq!(broker.ready_count(&binding.consumer_group), 3);

    let mut subscription = broker.subscribe(&binding.consumer_group, 1).await.unwrap();
    let delivery = subscription.next().await.unwrap();
    assert_eq!(WorkItem::from_bytes(delivery.body()).unwrap().project_id, 42);
}

#[tokio::test]
async fn enqueue_rejects_invalid_input() {
    let broker = broker();
    let binding = discovery();

    let err = enqueue_items(&broker, &binding, 0, 1).await.unwrap_err();
    assert!(matches!(err, CliError::Command(_)));

    let err = enqueue_items(&broker, &binding, 5, 0).await.unwrap_err();
    assert!(err.to_string().contains("--count"));

    assert_eq!(broker.ready_count(&binding.consumer_group), 0);
}

#[tokio::test]
async fn enqueue_to_undeclared_exchange_fails() {
    let broker = MemoryBroker::new();
    let err = enqueue_items(&broker, &discovery(), 42, 1).await.unwrap_err();
    assert!(matches!(err, CliError::Queue(_)), "{err:?}");
    assert_eq!(err.exit_code(), 1);
}

#[tokio::test]
async fn enqueue_report_text() {
    let broker = broker();
    let report = enqueue_items(&broker, &discovery(), 7, 1).await.unwrap();

    let mut buffer = Vec::new();
    OutputWriter::new(OutputFormat::Text)
        .render_to(&report, &mut buffer)
        .unwrap();
    let text = String::from_utf8(buffer).unwrap();
    assert!(text.contains("1 work item for project 7"));
    assert!(text.contains("'sbomer'"));
}

#[tokio::test]
async fn sbom_show_missing_project_is_not_found() {
    let store = MemoryResultStore::new();
    let err = lookup(&store, 99, false).await.unwrap_err();
    assert!(matches!(err, CliError::NotFound(_)));
    assert_eq!(err.exit_code(), 4);
    assert!(err.to_string().contains("project 99"));
}

#[tokio::test]
async fn sbom_show_summarises_without_document() {
    let store = MemoryResultStore::new();
    store
        .upsert_sbom(&record(10, br#"{"bomFormat":"CycloneDX"}"#))
        .await
        .unwrap();

    let report = lookup(&store, 10, false).await.unwrap();
    assert_eq!(report.path, "acme/foo");
    assert_eq!(report.document_bytes, 25);
    assert!(report.document.is_none());

    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["project_uid"], 10);
    assert_eq!(value["topics"][1], "backend");
    assert!(value.get("document").is_none());
}

#[tokio::test]
async fn sbom_show_embeds_json_documents_as_json() {
    let store = MemoryResultStore::new();
    store
        .upsert_sbom(&record(11, br#"{"bomFormat":"CycloneDX"}"#))
        .await
        .unwrap();

    let report = lookup(&store, 11, true).await.unwrap();
    assert!(matches!(report.document, Some(Document::Json(_))));

    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["document"]["bomFormat"], "CycloneDX");
}

#[tokio::test]
async fn sbom_show_keeps_other_documents_as_text() {
    let store = MemoryResultStore::new();
    store
        .upsert_sbom(&record(12, b"SPDXVersion: SPDX-2.3"))
        .await
        .unwrap();

    let report = lookup(&store, 12, true).await.unwrap();
    let mut buffer = Vec::new();
    OutputWriter::new(OutputFormat::Text)
        .render_to(&report, &mut buffer)
        .unwrap();
    let text = String::from_utf8(buffer).unwrap();
    assert!(text.contains("topics:   go, backend"));
    assert!(text.contains("SPDXVersion: SPDX-2.3"));
}
