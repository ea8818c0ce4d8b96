//! Worker configuration loaded from TOML
//!
//! Every field has a default, so an empty file (or no file at all) gives a
//! worker that runs `pdfcpu` from `PATH` and logs at `info`.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl WorkerConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        toml::from_str(s).context("Failed to parse TOML configuration")
    }
}

/// How the decrypt toolkit is invoked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Executable name or path (default: `pdfcpu`)
    #[serde(default = "default_program")]
    pub program: String,
    /// Parent directory for per-run sandboxes (default: system temp dir)
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            work_dir: None,
        }
    }
}

fn default_program() -> String {
    "pdfcpu".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset (default: `info`)
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = WorkerConfig::from_str("").unwrap();
        assert_eq!(config, WorkerConfig::default());
        assert_eq!(config.engine.program, "pdfcpu");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_full_config() {
        let config = WorkerConfig::from_str(
            r#"
            [engine]
            program = "/opt/pdfcpu/bin/pdfcpu"
            work_dir = "/var/tmp/pdftools"

            [logging]
            level = "pdftools_core=debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.program, "/opt/pdfcpu/bin/pdfcpu");
        assert_eq!(
            config.engine.work_dir,
            Some(PathBuf::from("/var/tmp/pdftools"))
        );
        assert_eq!(config.logging.level, "pdftools_core=debug");
    }

    #[test]
    fn test_malformed_config_is_rejected() {
        assert!(WorkerConfig::from_str("[engine\nprogram = 1").is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = WorkerConfig::from_file("/nonexistent/pdftools.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
