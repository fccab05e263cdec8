//! CLI argument parsing using clap derive API
//!
//! Purely declarative, no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// sbomer -- discover repositories, generate SBOMs, store the results.
///
/// Use `sbomer <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "sbomer", version, about, long_about = None)]
pub struct Cli {
    /// Path to the sbomer.toml configuration file.
    #[arg(short, long, default_value = "sbomer.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Publish work items for a project to the discovery exchange.
    Enqueue(EnqueueArgs),

    /// Apply database migrations and declare the queue topology.
    Migrate,

    /// Manage configuration.
    Config(ConfigArgs),

    /// Inspect stored SBOM records.
    Sbom(SbomArgs),
}

// ---- enqueue ----

#[derive(Args, Debug)]
pub struct EnqueueArgs {
    /// Project id on the repository platform.
    #[arg(short, long)]
    pub project: i64,

    /// Number of identical work items to publish.
    #[arg(short = 'n', long, default_value_t = 1)]
    pub count: u32,
}

// ---- config ----

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Load and validate the configuration file.
    Validate,

    /// Print the effective configuration with secrets masked.
    Show {
        /// Only this section (general, database, gitlab, queue, syft,
        /// fetcher, processor, metrics).
        #[arg(long)]
        section: Option<String>,
    },
}

// ---- sbom ----

#[derive(Args, Debug)]
pub struct SbomArgs {
    #[command(subcommand)]
    pub action: SbomAction,
}

#[derive(Subcommand, Debug)]
pub enum SbomAction {
    /// Show the stored record of a project.
    Show {
        /// Project id.
        project: i64,

        /// Include the SBOM document itself.
        #[arg(long)]
        document: bool,
    },
}
