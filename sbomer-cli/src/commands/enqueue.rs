//! `sbomer enqueue` command handler

use std::io::Write;

use bytes::Bytes;
use serde::Serialize;

use sbomer_core::config::{BindingConfig, SbomerConfig};
use sbomer_core::types::WorkItem;
use sbomer_queue::Publisher;

use crate::cli::EnqueueArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

pub async fn execute(
    args: EnqueueArgs,
    config: &SbomerConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let pool = super::connect(config).await?;
    let broker = super::broker(pool, config);
    super::declare_topology(&broker, config).await?;

    let report = enqueue_items(&broker, &config.queue.discovery, args.project, args.count).await?;
    writer.render(&report)
}

/// Publishes `count` work items for `project_id` to the discovery
/// exchange.
///
/// Stops at the first failed publish; items already published stay queued.
pub async fn enqueue_items<P: Publisher>(
    publisher: &P,
    binding: &BindingConfig,
    project_id: i64,
    count: u32,
) -> Result<EnqueueReport, CliError> {
    if count == 0 {
        return Err(CliError::Command("--count must be at least 1".to_owned()));
    }
    let item = WorkItem::new(project_id).map_err(|e| CliError::Command(e.to_string()))?;
    let body = Bytes::from(item.to_bytes());

    for published in 0..count {
        if let Err(e) = publisher
            .publish(&binding.exchange, &binding.routing_key, body.clone())
            .await
        {
            tracing::error!(project_id, published, error = %e, "publish failed");
            return Err(e.into());
        }
    }
    tracing::info!(project_id, count, exchange = %binding.exchange, "work items published");

    Ok(EnqueueReport {
        exchange: binding.exchange.clone(),
        routing_key: binding.routing_key.clone(),
        project_id,
        published: count,
    })
}

#[derive(Debug, Serialize)]
pub struct EnqueueReport {
    pub exchange: String,
    pub routing_key: String,
    pub project_id: i64,
    pub published: u32,
}

impl Render for EnqueueReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        let noun = if self.published == 1 { "item" } else { "items" };
        writeln!(
            w,
            "{} {} work {} for project {} to exchange '{}'",
            "Published".green().bold(),
            self.published,
            noun,
            self.project_id,
            self.exchange
        )
    }
}
