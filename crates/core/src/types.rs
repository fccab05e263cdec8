//! Domain types flowing through the job pipeline.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// One project to be scanned, carried on the discovery queue.
///
/// Wire form: `{"project_id": 42}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub project_id: i64,
}

impl WorkItem {
    /// Builds a work item, rejecting non-positive ids.
    pub fn new(project_id: i64) -> Result<Self, ParseError> {
        if project_id <= 0 {
            return Err(ParseError::InvalidProjectId(project_id));
        }
        Ok(Self { project_id })
    }

    /// Decodes a queue message body.
    pub fn from_bytes(body: &[u8]) -> Result<Self, ParseError> {
        let item: WorkItem =
            serde_json::from_slice(body).map_err(|e| ParseError::Malformed(e.to_string()))?;
        Self::new(item.project_id)
    }

    /// Encodes the item as a queue message body.
    pub fn to_bytes(&self) -> Vec<u8> {
        // a struct with one integer field always serializes
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Listing scope for discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Every project visible to the token.
    All,
    /// Projects of one group (numeric id or full path), subgroups included.
    Group(String),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Group(id) => write!(f, "group:{id}"),
        }
    }
}

/// Minimal project view returned by the listing endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProjectSummary {
    pub id: i64,
    #[serde(default)]
    pub topics: Vec<String>,
}

/// One page of the project listing.
#[derive(Debug, Clone, Default)]
pub struct ProjectPage {
    pub projects: Vec<ProjectSummary>,
    /// Cursor for the next page. `None` ends the scope.
    pub next_page: Option<u32>,
}

/// Project metadata fetched fresh for every work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDetails {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub topics: Vec<String>,
    pub default_branch: String,
    /// Credential-free clone URL.
    pub clone_url: String,
}

/// SBOM record as written to the result store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SbomRecord {
    pub project_uid: i64,
    pub name: String,
    pub path: String,
    pub topics: Vec<String>,
    pub sbom_document: Vec<u8>,
}

impl SbomRecord {
    pub fn from_details(details: &ProjectDetails, sbom_document: Vec<u8>) -> Self {
        Self {
            project_uid: details.id,
            name: details.name.clone(),
            path: details.path.clone(),
            topics: details.topics.clone(),
            sbom_document,
        }
    }
}

/// A stored record with its bookkeeping timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSbom {
    pub record: SbomRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Clone,
    Sbom,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clone => "clone",
            Self::Sbom => "sbom",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome recorded for an audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Started,
    Success,
    Failed,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only audit entry, one per phase transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationLogEntry {
    pub project_id: i64,
    pub operation: Operation,
    pub status: OperationStatus,
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl OperationLogEntry {
    pub fn new(project_id: i64, operation: Operation, status: OperationStatus) -> Self {
        Self {
            project_id,
            operation,
            status,
            error_message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(project_id: i64, operation: Operation, error: impl fmt::Display) -> Self {
        Self {
            error_message: Some(error.to_string()),
            ..Self::new(project_id, operation, OperationStatus::Failed)
        }
    }
}

/// One row per processed discovery page.
///
/// `projects_count` is the running total of the pass so far, not the size
/// of this page.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchStats {
    pub projects_count: i64,
    pub batch_size: i64,
    pub duration_seconds: f64,
    pub created_at: DateTime<Utc>,
}

/// Metadata block of a downstream scan request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanMetadata {
    pub project_id: String,
    pub project_title: String,
    pub project_url: String,
    pub job_id: String,
    pub commit_branch: String,
    pub source: String,
    /// `YYYY-MM-DD`.
    pub generated_date: String,
    pub sbom_format: String,
    pub version: String,
    pub topics_id: Vec<String>,
}

/// SBOM embedded in a scan request.
///
/// Documents that decode as JSON are embedded structurally; anything else
/// is carried as a JSON string for the consumer to re-parse. A top-level
/// string always decodes as [`EmbeddedSbom::Raw`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EmbeddedSbom {
    Json(serde_json::Value),
    Raw(String),
}

impl EmbeddedSbom {
    /// Never fails: undecodable bytes fall back to lossy text.
    pub fn from_document(document: &[u8]) -> Self {
        match serde_json::from_slice::<serde_json::Value>(document) {
            Ok(value) => Self::from_value(value),
            Err(_) => Self::Raw(String::from_utf8_lossy(document).into_owned()),
        }
    }

    fn from_value(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(text) => Self::Raw(text),
            other => Self::Json(other),
        }
    }
}

impl<'de> Deserialize<'de> for EmbeddedSbom {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Self::from_value)
    }
}

/// Event published downstream once a project's SBOM is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRequestEvent {
    pub metadata: ScanMetadata,
    pub sbom: EmbeddedSbom,
}
