use anyhow::{Context, Result};
use eva_core::ExecutorConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Behaviour of the simulated tools backing every catalog tool id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,

    /// Tool ids that always fail, for rehearsing failure handling
    #[serde(default)]
    pub failing_tools: Vec<String>,
}

fn default_latency_ms() -> u64 {
    250
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            latency_ms: default_latency_ms(),
            failing_tools: Vec::new(),
        }
    }
}

impl CliConfig {
    pub fn load(config_path: &Path) -> Result<Self> {
        // Load config file if it exists, otherwise use defaults
        if !config_path.exists() {
            tracing::info!("Configuration file not found, using defaults");
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(config_path).context("Failed to read configuration file")?;
        toml::from_str(&content).context("Failed to parse configuration file")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eva_core::FailurePolicy;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = CliConfig::load(&dir.path().join("eva.toml")).unwrap();

        assert_eq!(config.executor, ExecutorConfig::default());
        assert_eq!(config.simulation.latency_ms, 250);
        assert!(config.simulation.failing_tools.is_empty());
    }

    #[test]
    fn test_load_sections() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("eva.toml");
        std::fs::write(
            &path,
            r#"
[executor]
failure_policy = "abort_wave"
max_concurrency = 3

[simulation]
failing_tools = ["credit-report"]
"#,
        )
        .unwrap();

        let config = CliConfig::load(&path).unwrap();
        assert_eq!(config.executor.failure_policy, FailurePolicy::AbortWave);
        assert_eq!(config.executor.max_concurrency, Some(3));
        assert_eq!(config.simulation.latency_ms, 250);
        assert_eq!(config.simulation.failing_tools, vec!["credit-report"]);
    }

    #[test]
    fn test_invalid_file_reports_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("eva.toml");
        std::fs::write(&path, "[executor\n").unwrap();

        let err = CliConfig::load(&path).unwrap_err();
        assert_eq!(err.to_string(), "Failed to parse configuration file");
    }
}
