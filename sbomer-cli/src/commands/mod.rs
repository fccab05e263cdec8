//! Subcommand handlers.

pub mod config;
pub mod enqueue;
pub mod migrate;
pub mod sbom;

use std::time::Duration;

use sbomer_core::config::SbomerConfig;
use sbomer_queue::{Binding, PgBroker};
use sbomer_store::PgPool;

use crate::error::CliError;

/// Opens a pool sized for a short-lived command.
pub(crate) async fn connect(config: &SbomerConfig) -> Result<PgPool, CliError> {
    tracing::debug!(
        host = %config.database.host,
        dbname = %config.database.dbname,
        "connecting to PostgreSQL"
    );
    Ok(sbomer_store::connect(&config.database_url(), 2).await?)
}

pub(crate) fn broker(pool: PgPool, config: &SbomerConfig) -> PgBroker {
    PgBroker::new(pool, Duration::from_millis(config.queue.poll_interval_ms))
}

/// Creates the queue tables and declares both configured bindings.
/// Returns the declared consumer groups.
pub(crate) async fn declare_topology(
    broker: &PgBroker,
    config: &SbomerConfig,
) -> Result<Vec<String>, CliError> {
    broker.ensure_schema().await?;
    let mut groups = Vec::with_capacity(2);
    for binding_config in [&config.queue.discovery, &config.queue.downstream] {
        let binding = Binding::try_from(binding_config)?;
        broker.declare(&binding).await?;
        groups.push(binding_config.consumer_group.clone());
    }
    Ok(groups)
}
