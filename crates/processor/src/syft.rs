//! [`SbomGenerator`] backed by the `syft` CLI.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use sbomer_core::config::SyftConfig;
use sbomer_core::error::GeneratorError;
use sbomer_core::pipeline::SbomGenerator;
use tokio::process::Command;
use tracing::debug;

/// Runs `syft scan <source> -o=<format>=<output>`.
///
/// A bare binary name is looked up on `PATH`, skipping files without the
/// executable bit; anything containing a path separator is made absolute
/// and must exist. The lookup happens on every call so a binary installed
/// after start-up is picked up.
pub struct SyftGenerator {
    format: String,
    bin_path: String,
}

impl SyftGenerator {
    pub fn new(format: impl Into<String>, bin_path: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            bin_path: bin_path.into(),
        }
    }

    pub fn from_config(config: &SyftConfig) -> Self {
        Self::new(&config.format, &config.bin_path)
    }

    /// Resolves the configured binary to an executable path.
    pub fn resolve_binary(&self) -> Result<PathBuf, GeneratorError> {
        let configured = Path::new(&self.bin_path);

        if configured.components().count() == 1 && !configured.is_absolute() {
            return which::which(&self.bin_path).map_err(|e| {
                GeneratorError::BinaryNotFound(format!("'{}' not found in PATH: {e}", self.bin_path))
            });
        }

        let absolute = std::path::absolute(configured).map_err(|e| {
            GeneratorError::BinaryNotFound(format!("'{}': {e}", self.bin_path))
        })?;
        if !absolute.is_file() {
            return Err(GeneratorError::BinaryNotFound(format!(
                "no file at {}",
                absolute.display()
            )));
        }
        Ok(absolute)
    }
}

impl SbomGenerator for SyftGenerator {
    async fn generate(&self, source: &Path, output: &Path) -> Result<(), GeneratorError> {
        let binary = self.resolve_binary()?;
        debug!(
            binary = %binary.display(),
            source = %source.display(),
            output = %output.display(),
            format = %self.format,
            "running syft"
        );

        let result = Command::new(&binary)
            .arg("scan")
            .arg(source)
            .arg(format!("-o={}={}", self.format, output.display()))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| GeneratorError::Spawn(format!("{}: {e}", binary.display())))?;

        if result.status.success() {
            return Ok(());
        }

        let mut combined = String::from_utf8_lossy(&result.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&result.stderr));
        Err(GeneratorError::Failed {
            status: result.status.to_string(),
            output: combined.trim().to_owned(),
        })
    }

    fn format(&self) -> &str {
        &self.format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_bare_name_is_not_found() {
        let generator = SyftGenerator::new("cyclonedx-json", "sbomer-no-such-syft-binary");
        assert!(matches!(
            generator.resolve_binary(),
            Err(GeneratorError::BinaryNotFound(_))
        ));
    }

    #[test]
    fn missing_explicit_path_is_not_found() {
        let generator = SyftGenerator::new("cyclonedx-json", "./bin/not-here/syft");
        let err = generator.resolve_binary().unwrap_err();
        assert!(err.to_string().contains("not-here"));
    }

    #[test]
    fn explicit_path_is_made_absolute() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("syft");
        std::fs::write(&bin, b"").unwrap();

        let generator = SyftGenerator::new("spdx-json", bin.display().to_string());
        assert_eq!(generator.resolve_binary().unwrap(), bin);
        assert_eq!(generator.format(), "spdx-json");
    }

    #[test]
    fn from_config_uses_defaults() {
        let generator = SyftGenerator::from_config(&SyftConfig::default());
        assert_eq!(generator.format(), "cyclonedx-json");
    }
}
