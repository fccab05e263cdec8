//! `sbomer migrate` command handler

use std::io::Write;

use serde::Serialize;

use sbomer_core::config::SbomerConfig;

use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Applies the embedded store migrations, then creates the queue tables
/// and declares the discovery and downstream bindings. Safe to rerun.
pub async fn execute(config: &SbomerConfig, writer: &OutputWriter) -> Result<(), CliError> {
    let pool = super::connect(config).await?;
    sbomer_store::migrate(&pool).await?;
    tracing::info!("store migrations applied");

    let broker = super::broker(pool, config);
    let consumer_groups = super::declare_topology(&broker, config).await?;
    tracing::info!(groups = ?consumer_groups, "queue topology declared");

    writer.render(&MigrateReport {
        database: format!("{}/{}", config.database.host, config.database.dbname),
        consumer_groups,
    })
}

#[derive(Debug, Serialize)]
pub struct MigrateReport {
    pub database: String,
    pub consumer_groups: Vec<String>,
}

impl Render for MigrateReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Migrations applied to {}", self.database.bold())?;
        for group in &self.consumer_groups {
            writeln!(w, "  consumer group: {}", group)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_lists_consumer_groups() {
        let report = MigrateReport {
            database: "localhost/sbomer".to_owned(),
            consumer_groups: vec!["sbomer-group".to_owned(), "sbom-scan-requests".to_owned()],
        };
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("localhost/sbomer"));
        assert!(text.contains("consumer group: sbomer-group"));
        assert!(text.contains("consumer group: sbom-scan-requests"));
    }
}
