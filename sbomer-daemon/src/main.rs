use anyhow::Result;
use clap::Parser;

use sbomer_core::config::SbomerConfig;
use sbomer_daemon::cli::DaemonCli;
use sbomer_daemon::logging;
use sbomer_daemon::orchestrator::{Orchestrator, check_stages};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let mut config = SbomerConfig::load(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load {}: {}", cli.config.display(), e))?;
    if let Some(level) = cli.log_level {
        config.general.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.general.log_format = format;
    }

    if cli.validate {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;
        check_stages(&config)?;
        println!("configuration OK: {}", cli.config.display());
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "sbomer-daemon starting"
    );

    let mut orchestrator = Orchestrator::build_from_config(config).await.map_err(|e| {
        tracing::error!(error = %e, "initialization failed");
        e
    })?;
    orchestrator.run().await?;
    Ok(())
}
