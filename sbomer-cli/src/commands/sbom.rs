//! `sbomer sbom` command handler

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use sbomer_core::config::SbomerConfig;
use sbomer_core::pipeline::ResultStore;
use sbomer_store::PgResultStore;

use crate::cli::{SbomAction, SbomArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

pub async fn execute(
    args: SbomArgs,
    config: &SbomerConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        SbomAction::Show { project, document } => {
            let store = PgResultStore::new(super::connect(config).await?);
            let report = lookup(&store, project, document).await?;
            writer.render(&report)
        }
    }
}

/// Fetches the stored record of `project_uid`.
///
/// # Errors
///
/// [`CliError::NotFound`] when no record exists.
pub async fn lookup<S: ResultStore>(
    store: &S,
    project_uid: i64,
    include_document: bool,
) -> Result<SbomReport, CliError> {
    let stored = store
        .get_sbom(project_uid)
        .await?
        .ok_or_else(|| CliError::NotFound(format!("no SBOM stored for project {project_uid}")))?;

    let record = stored.record;
    let document = include_document.then(|| Document::from_bytes(&record.sbom_document));
    Ok(SbomReport {
        project_uid: record.project_uid,
        name: record.name,
        path: record.path,
        topics: record.topics,
        document_bytes: record.sbom_document.len(),
        created_at: stored.created_at,
        updated_at: stored.updated_at,
        document,
    })
}

#[derive(Debug, Serialize)]
pub struct SbomReport {
    pub project_uid: i64,
    pub name: String,
    pub path: String,
    pub topics: Vec<String>,
    pub document_bytes: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<Document>,
}

/// The stored document, parsed when it is JSON.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Document {
    Json(serde_json::Value),
    Text(String),
}

impl Document {
    fn from_bytes(bytes: &[u8]) -> Self {
        match serde_json::from_slice(bytes) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(String::from_utf8_lossy(bytes).into_owned()),
        }
    }
}

impl Render for SbomReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "{} ({})", self.path.bold(), self.project_uid)?;
        writeln!(w, "  name:     {}", self.name)?;
        if self.topics.is_empty() {
            writeln!(w, "  topics:   -")?;
        } else {
            writeln!(w, "  topics:   {}", self.topics.join(", "))?;
        }
        writeln!(w, "  document: {} bytes", self.document_bytes)?;
        writeln!(w, "  created:  {}", self.created_at.to_rfc3339())?;
        writeln!(w, "  updated:  {}", self.updated_at.to_rfc3339())?;

        match &self.document {
            Some(Document::Json(value)) => {
                writeln!(w)?;
                let pretty = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
                writeln!(w, "{}", pretty)?;
            }
            Some(Document::Text(text)) => {
                writeln!(w)?;
                writeln!(w, "{}", text)?;
            }
            None => {}
        }
        Ok(())
    }
}
