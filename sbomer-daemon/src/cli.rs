//! Command-line flags for sbomer-daemon.

use std::path::PathBuf;

use clap::Parser;

/// sbomer daemon.
///
/// Discovers repositories on a GitLab instance, generates an SBOM for each
/// one and publishes a scan request per SBOM.
#[derive(Parser, Debug)]
#[command(name = "sbomer-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to the sbomer.toml configuration file.
    #[arg(short, long, default_value = "sbomer.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate the configuration file and exit without starting.
    #[arg(long)]
    pub validate: bool,
}
