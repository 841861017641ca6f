use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What happens to the rest of a wave once one of its steps fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Let steps already in flight finish and record their results
    #[default]
    DrainWave,
    /// Drop steps still in flight and mark them skipped
    AbortWave,
}

/// Executor tuning, usually read from the `[executor]` table of a TOML file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Upper bound on concurrent tool calls within one wave.
    /// Unset or zero means the whole wave is dispatched at once.
    #[serde(default)]
    pub max_concurrency: Option<usize>,
}

impl ExecutorConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse executor configuration")
    }

    /// Load configuration from a file, falling back to defaults when it is missing
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("Executor configuration not found, using defaults");
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).context("Failed to read executor configuration")?;
        Self::from_toml_str(&content)
    }

    /// Effective limit on in-flight calls per wave
    pub fn concurrency_limit(&self) -> usize {
        match self.max_concurrency {
            Some(n) if n > 0 => n,
            _ => usize::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExecutorConfig::from_toml_str("").unwrap();
        assert_eq!(config.failure_policy, FailurePolicy::DrainWave);
        assert_eq!(config.max_concurrency, None);
        assert_eq!(config.concurrency_limit(), usize::MAX);
    }

    #[test]
    fn test_parse() {
        let config = ExecutorConfig::from_toml_str(
            r#"
            failure_policy = "abort_wave"
            max_concurrency = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.failure_policy, FailurePolicy::AbortWave);
        assert_eq!(config.concurrency_limit(), 2);
    }

    #[test]
    fn test_zero_concurrency_means_unbounded() {
        let config = ExecutorConfig {
            max_concurrency: Some(0),
            ..Default::default()
        };
        assert_eq!(config.concurrency_limit(), usize::MAX);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ExecutorConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, ExecutorConfig::default());
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let err = ExecutorConfig::from_toml_str("failure_policy = \"retry\"").unwrap_err();
        assert!(err.to_string().contains("Failed to parse executor configuration"));
    }
}
