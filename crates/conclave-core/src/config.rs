//! Core Configuration
//!
//! Tunables for the orchestrator and the memory engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::provider::GenerateOptions;

/// Top-level core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// Orchestrator configuration
    pub orchestrator: OrchestratorConfig,

    /// Memory engine configuration
    pub memory: MemoryConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("conclave.db"),
            orchestrator: OrchestratorConfig::default(),
            memory: MemoryConfig::default(),
        }
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Per provider call timeout in milliseconds (default: 30000)
    pub step_timeout_ms: u64,

    /// Dispatch sibling steps of an iteration concurrently (default: true)
    pub concurrent_steps: bool,

    /// Knowledge items recalled per agent for first-iteration context (default: 5)
    pub recall_limit: usize,

    /// Generation options passed to every provider call
    pub generation: GenerateOptions,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            step_timeout_ms: 30_000,
            concurrent_steps: true,
            recall_limit: 5,
            generation: GenerateOptions::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }
}

/// Memory engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Timeout for insight extraction in milliseconds (default: 10000)
    pub insight_timeout_ms: u64,

    /// Default recall limit per result set (default: 10)
    pub recall_limit: usize,

    /// Minimum relevance for recalled knowledge, 0.0 - 1.0 (default: 0.3)
    pub min_relevance: f64,

    /// Knowledge below this confidence is eligible for forgetting (default: 20)
    pub obsolete_confidence: f64,

    /// Days without access before low-confidence knowledge is forgotten (default: 30)
    pub obsolete_after_days: i64,

    /// Window for "recent knowledge" insights (default: 7 days)
    pub recent_window_days: i64,

    /// Window for "recent failure" suggestions (default: 30 days)
    pub failure_window_days: i64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            insight_timeout_ms: 10_000,
            recall_limit: 10,
            min_relevance: 0.3,
            obsolete_confidence: 20.0,
            obsolete_after_days: 30,
            recent_window_days: 7,
            failure_window_days: 30,
        }
    }
}

impl MemoryConfig {
    pub fn insight_timeout(&self) -> Duration {
        Duration::from_millis(self.insight_timeout_ms)
    }
}

impl CoreConfig {
    /// Create a new config with the given database path
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Default::default()
        }
    }

    /// Set orchestrator configuration
    pub fn with_orchestrator(mut self, orchestrator: OrchestratorConfig) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    /// Set memory configuration
    pub fn with_memory(mut self, memory: MemoryConfig) -> Self {
        self.memory = memory;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.orchestrator.step_timeout_ms == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "orchestrator.step_timeout_ms".into(),
                message: "must be greater than 0".into(),
            });
        }

        if self.memory.recall_limit == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "memory.recall_limit".into(),
                message: "must be greater than 0".into(),
            });
        }

        if !(0.0..=1.0).contains(&self.memory.min_relevance) {
            return Err(ConfigValidationError::InvalidValue {
                field: "memory.min_relevance".into(),
                message: "must be between 0 and 1".into(),
            });
        }

        if !(0.0..=100.0).contains(&self.memory.obsolete_confidence) {
            return Err(ConfigValidationError::InvalidValue {
                field: "memory.obsolete_confidence".into(),
                message: "must be between 0 and 100".into(),
            });
        }

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoreConfig::default();
        assert_eq!(config.orchestrator.step_timeout_ms, 30_000);
        assert!(config.orchestrator.concurrent_steps);
        assert_eq!(config.memory.recall_limit, 10);
        assert_eq!(config.memory.obsolete_after_days, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = CoreConfig::new("test.db");
        config.orchestrator.step_timeout_ms = 0;
        assert!(config.validate().is_err());

        config.orchestrator.step_timeout_ms = 1000;
        config.memory.min_relevance = 1.5;
        assert!(config.validate().is_err());

        config.memory.min_relevance = 0.5;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let config: CoreConfig = serde_json::from_str(
            r#"{ "orchestrator": { "step_timeout_ms": 5000 } }"#,
        )
        .unwrap();

        assert_eq!(config.orchestrator.step_timeout(), Duration::from_secs(5));
        assert!(config.orchestrator.concurrent_steps);
        assert_eq!(config.memory.min_relevance, 0.3);
    }
}
