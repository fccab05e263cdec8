use std::path::Path;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sbomer_cli::cli::{Cli, Commands};
use sbomer_cli::commands;
use sbomer_cli::error::CliError;
use sbomer_cli::output::OutputWriter;
use sbomer_core::config::SbomerConfig;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    if let Err(e) = run(cli).await {
        eprintln!("error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let writer = OutputWriter::new(cli.output);

    match cli.command {
        // `config validate` reports load failures itself.
        Commands::Config(args) => commands::config::execute(args, &cli.config, &writer).await,
        Commands::Enqueue(args) => {
            let config = load_config(&cli.config).await?;
            commands::enqueue::execute(args, &config, &writer).await
        }
        Commands::Migrate => {
            let config = load_config(&cli.config).await?;
            commands::migrate::execute(&config, &writer).await
        }
        Commands::Sbom(args) => {
            let config = load_config(&cli.config).await?;
            commands::sbom::execute(args, &config, &writer).await
        }
    }
}

async fn load_config(path: &Path) -> Result<SbomerConfig, CliError> {
    SbomerConfig::load(path)
        .await
        .map_err(|e| CliError::Config(format!("{}: {}", path.display(), e)))
}

/// Logs go to stderr so stdout stays parseable.
fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
