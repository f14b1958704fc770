//! Exporter configuration.
//!
//! Settings come from an optional TOML file and are overridden by
//! command-line flags. The flag names follow the usual exporter
//! `--collector.<name>.<option>` and `--web.<option>` conventions.

use crate::collector::{PuppetConfig, SummarySchema};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("telemetry path must start with '/': {0}")]
    InvalidTelemetryPath(String),
    #[error("telemetry path is reserved: {0}")]
    ReservedTelemetryPath(String),
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Command-line arguments.
#[derive(Debug, Default, Parser)]
#[command(name = "puppet-exporter", version, about)]
pub struct Cli {
    /// TOML configuration file.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Path where puppet stores its summary file.
    #[arg(
        long = "collector.puppet.summaryfile",
        env = "PUPPET_SUMMARY_FILE",
        value_name = "PATH"
    )]
    pub summary_file: Option<PathBuf>,

    /// Summary layout to export.
    #[arg(long = "collector.puppet.schema", value_enum)]
    pub schema: Option<SummarySchema>,

    /// Address to listen on for telemetry.
    #[arg(long = "web.listen-address", value_name = "ADDR")]
    pub listen_address: Option<SocketAddr>,

    /// Path under which to expose metrics.
    #[arg(long = "web.telemetry-path", value_name = "PATH")]
    pub telemetry_path: Option<String>,

    /// Print a single scrape to stdout and exit.
    #[arg(long)]
    pub once: bool,
}

/// HTTP exposition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Address to bind the server to.
    pub listen_address: SocketAddr,
    /// Path serving the metrics.
    pub telemetry_path: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen_address: ([0, 0, 0, 0], 9100).into(),
            telemetry_path: "/metrics".to_string(),
        }
    }
}

impl WebConfig {
    /// Validates the web settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.telemetry_path.starts_with('/') {
            return Err(ConfigError::InvalidTelemetryPath(self.telemetry_path.clone()));
        }
        if self.telemetry_path == "/" || self.telemetry_path == "/health" {
            return Err(ConfigError::ReservedTelemetryPath(self.telemetry_path.clone()));
        }
        Ok(())
    }
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub puppet: PuppetConfig,
    #[serde(default)]
    pub web: WebConfig,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.web.validate()?;
        Ok(config)
    }

    /// Builds the effective configuration: file (if any), then flags.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply(cli);
        config.web.validate()?;
        Ok(config)
    }

    fn apply(&mut self, cli: &Cli) {
        if let Some(path) = &cli.summary_file {
            self.puppet.summary_file = path.clone();
        }
        if let Some(schema) = cli.schema {
            self.puppet.schema = schema;
        }
        if let Some(addr) = cli.listen_address {
            self.web.listen_address = addr;
        }
        if let Some(path) = &cli.telemetry_path {
            self.web.telemetry_path = path.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::DEFAULT_SUMMARY_FILE;

    #[test]
    fn test_default_config_valid() {
        let config = FileConfig::default();
        assert!(config.web.validate().is_ok());
        assert_eq!(config.puppet.summary_file, Path::new(DEFAULT_SUMMARY_FILE));
        assert_eq!(config.web.listen_address.port(), 9100);
    }

    #[test]
    fn test_partial_toml() {
        let config = FileConfig::from_toml(
            r#"
            [puppet]
            summary_file = "/opt/puppetlabs/puppet/cache/state/last_run_summary.yaml"
            schema = "reduced"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.puppet.summary_file,
            Path::new("/opt/puppetlabs/puppet/cache/state/last_run_summary.yaml")
        );
        assert_eq!(config.puppet.schema, SummarySchema::Reduced);
        assert_eq!(config.web.telemetry_path, "/metrics");
    }

    #[test]
    fn test_invalid_telemetry_path() {
        let result = FileConfig::from_toml("[web]\ntelemetry_path = \"metrics\"\n");
        assert!(matches!(result, Err(ConfigError::InvalidTelemetryPath(_))));
    }

    #[test]
    fn test_reserved_telemetry_path() {
        let result = FileConfig::from_toml("[web]\ntelemetry_path = \"/health\"\n");
        assert!(matches!(result, Err(ConfigError::ReservedTelemetryPath(_))));
    }

    #[test]
    fn test_flags_override_file() {
        let cli = Cli::parse_from([
            "puppet-exporter",
            "--collector.puppet.summaryfile",
            "/tmp/summary.yaml",
            "--collector.puppet.schema",
            "reduced",
            "--web.listen-address",
            "127.0.0.1:9200",
        ]);

        let mut config = FileConfig::default();
        config.apply(&cli);

        assert_eq!(config.puppet.summary_file, Path::new("/tmp/summary.yaml"));
        assert_eq!(config.puppet.schema, SummarySchema::Reduced);
        assert_eq!(config.web.listen_address.port(), 9200);
        assert_eq!(config.web.telemetry_path, "/metrics");
    }

    #[test]
    fn test_missing_config_file() {
        let result = FileConfig::from_file("/nonexistent/puppet-exporter.toml");
        assert!(matches!(result, Err(ConfigError::FileReadError(_))));
    }
}
